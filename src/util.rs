/// Mutex used for state that is never held across a blocking wait.
pub(crate) type SyncMutex<T> = parking_lot::Mutex<T>;

/// Read-write lock for structures that are looked up far more often than
/// they are mutated.
pub(crate) type SyncRwLock<T> = parking_lot::RwLock<T>;

/// Returns a string representation of the specified type.
macro_rules! name_of {
    ($t:ty) => {{
        type _T = $t; // Allows $t to be recognized as a type for refactoring
        stringify!($t)
    }};
}
pub(crate) use name_of;
