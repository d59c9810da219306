//! The completion bridge: the components that sit between the host
//! engine's worker thread and the storage client's background execution.

pub(crate) mod buffer;
pub(crate) mod downloader;
pub(crate) mod handle_table;
pub(crate) mod session;
#[cfg(test)]
pub(crate) mod test_util;
