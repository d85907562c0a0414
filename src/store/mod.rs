//! Persistence (§9): every component depends on a narrow store trait, not
//! a concrete database. The in-memory implementations beside each trait
//! are the default and the only ones exercised by the test suite; a
//! Postgres-backed `Order`/`Escrow` pair is available behind the
//! `postgres` feature for deployments that want durability, following the
//! source's `PgPool`-plus-CAS-update shape.

#[cfg(feature = "postgres")]
pub mod postgres;
