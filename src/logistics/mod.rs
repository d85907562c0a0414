//! Logistics (§4.5): provider registry, quote auction, and shipment
//! tracking through to proof of delivery.

pub mod provider;
pub mod quote;
pub mod service;
pub mod shipment;

pub use provider::{InMemoryProviderStore, Provider, ProviderStore};
pub use quote::{InMemoryQuoteStore, Quote, QuoteState, QuoteStore};
pub use service::Service;
pub use shipment::{InMemoryShipmentStore, Shipment, ShipmentState, ShipmentStore, TrackingEvent};
