use std::fmt::Debug;
use std::sync::Mutex;
use tracing::debug;

use crate::models::SessionAddress;

/// Receives the navigable projection of the session. Implementations update
/// the visible address in place, without navigating or reloading.
pub trait AddressSink: Send + Sync + Debug {
    fn replace(&self, address: &SessionAddress);
}

/// Keeps only the latest address; used when nothing outside observes it.
#[derive(Debug, Default)]
pub struct LatestAddress {
    current: Mutex<Option<SessionAddress>>,
}

impl LatestAddress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<SessionAddress> {
        self.current
            .lock()
            .map(|current| current.clone())
            .unwrap_or_default()
    }
}

impl AddressSink for LatestAddress {
    fn replace(&self, address: &SessionAddress) {
        debug!(
            "Address -> source={} id={} year={} title={}",
            address.source, address.id, address.year, address.title
        );
        if let Ok(mut current) = self.current.lock() {
            *current = Some(address.clone());
        }
    }
}

/// Render an address as a query string, e.g. for a `play?...` URL.
pub fn to_query_string(address: &SessionAddress) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("source", address.source.as_str())
        .append_pair("id", address.id.as_str())
        .append_pair("year", &address.year)
        .append_pair("title", &address.title)
        .finish()
}
