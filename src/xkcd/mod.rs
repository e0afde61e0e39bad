//! xkcd comic lookup: the reference consumer of the resilience and timer
//! layers.

mod client;
mod model;
mod service;

pub use client::{XKCD_COMMAND, XKCD_HTTP_CLIENT, XkcdClient};
pub use model::{Xkcd, XkcdResponse};
pub use service::{COMIC_BY_ID_DEFERRED_TIMER, COMIC_BY_ID_TIMER, XkcdService};
