use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

/// Position of a transaction in the source stream. Strictly increasing.
pub type Checkpoint = u64;

/// Free-form metadata attached to transactions and events.
pub type Headers = HashMap<String, serde_json::Value>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Last segment of a type path, e.g. `ProductCatalogEntry` for
/// `crate::shell::catalog::ProductCatalogEntry`.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}
