// Composition root of the product catalog service.
//
// Responsibilities:
// - Read config from environment.
// - Instantiate the store, caches and projectors.
// - Feed the projector from the event log and serve its read model over HTTP.

pub mod catalog;
pub mod http;
pub mod state;
