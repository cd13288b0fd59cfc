//! Local caches: recent decision history and the reference-class mirror.

mod reference;
mod results;

pub use reference::{ReferenceClass, ReferenceDataCache};
pub use results::{ResultCache, RESULT_CACHE_CAPACITY};
