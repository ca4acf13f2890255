use std::fmt;
use std::sync::Arc;

/// A value that is either fixed when the operation is built or produced
/// fresh for every attempt (rotating auth tokens, signed URLs, ...).
pub enum Source<T> {
    Fixed(T),
    Producer(Arc<dyn Fn() -> T + Send + Sync>),
}

impl<T: Clone> Source<T> {
    pub fn producer(f: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Source::Producer(Arc::new(f))
    }

    pub fn resolve(&self) -> T {
        match self {
            Source::Fixed(v) => v.clone(),
            Source::Producer(f) => f(),
        }
    }
}

impl<T> From<T> for Source<T> {
    fn from(v: T) -> Self {
        Source::Fixed(v)
    }
}

impl<T: Clone> Clone for Source<T> {
    fn clone(&self) -> Self {
        match self {
            Source::Fixed(v) => Source::Fixed(v.clone()),
            Source::Producer(f) => Source::Producer(f.clone()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Fixed(v) => f.debug_tuple("Fixed").field(v).finish(),
            Source::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}
