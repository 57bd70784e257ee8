//! Products domain module.
//!
//! Catalog rules as pure logic (no IO, no HTTP, no storage). `quantity` is
//! carried here for reads only; it changes solely through the stock ledger.

pub mod product;

pub use product::{MAX_LABEL_LEN, NewProduct, Product, ProductPatch, ProductView};
