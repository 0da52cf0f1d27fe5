use bytes::BytesMut;

/// Wraps an `AsyncRead` with a growable receive buffer so that a frame spanning
/// multiple `read` calls can be reassembled before it is handed to the caller.
#[derive(Debug)]
pub struct BufferedReader<T> {
    pub(crate) inner: T,
    pub(crate) buffer: BytesMut,
}

impl<T> BufferedReader<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
        }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }
}

impl<T> std::ops::Deref for BufferedReader<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> std::ops::DerefMut for BufferedReader<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}
