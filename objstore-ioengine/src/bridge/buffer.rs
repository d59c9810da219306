use std::ptr::NonNull;

/// A caller-owned destination buffer for one range read.
///
/// The host engine owns the memory; this type is a view over it that
/// travels to the storage client's completion context, gets filled there,
/// and is dropped once the outcome has been delivered.
///
/// Ownership discipline is the same as handing a buffer to the kernel for
/// an in-flight operation: between `queue` and the retrieval of the
/// request's completion record, the buffer belongs to the storage client
/// and must not be read, written, or freed by anyone else.
pub struct IoBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the host contract guarantees exclusive access while the read is
// in flight, so moving the view to the client's execution context is sound.
unsafe impl Send for IoBuffer {}

impl IoBuffer {
    /// Builds a buffer view from raw parts.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `len` bytes of writable memory that stays valid
    /// and untouched by the caller until the completion record for the
    /// request carrying this buffer has been retrieved.
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize) -> Self {
        IoBuffer {
            ptr: NonNull::new(ptr).expect("buffer pointer must be non-null"),
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copies `src` into the buffer, truncating to the buffer's length.
    /// Returns the number of bytes written.
    pub fn copy_from(&mut self, src: &[u8]) -> usize {
        let n = std::cmp::min(self.len, src.len());
        // SAFETY: `ptr` is valid for `len` writable bytes per the
        // `from_raw_parts` contract, and `n <= len`.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.as_ptr(), n);
        }
        n
    }
}

impl std::fmt::Debug for IoBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoBuffer").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_truncates_to_buffer_length() {
        let mut backing = vec![0u8; 4];
        let mut buf = unsafe { IoBuffer::from_raw_parts(backing.as_mut_ptr(), backing.len()) };
        assert_eq!(buf.copy_from(&[1, 2, 3, 4, 5, 6]), 4);
        drop(buf);
        assert_eq!(backing, vec![1, 2, 3, 4]);
    }

    #[test]
    fn short_source_leaves_tail_untouched() {
        let mut backing = vec![9u8; 4];
        let mut buf = unsafe { IoBuffer::from_raw_parts(backing.as_mut_ptr(), backing.len()) };
        assert_eq!(buf.copy_from(&[1, 2]), 2);
        drop(buf);
        assert_eq!(backing, vec![1, 2, 9, 9]);
    }
}
