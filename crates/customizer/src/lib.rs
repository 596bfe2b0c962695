//! # baton-customizer
//!
//! Mutators that turn well-formed Engine API calls into the malformed ones
//! negative tests need.
//!
//! ## Overview
//!
//! Three layers of customization, all data-driven enums and patch structs so
//! test definitions stay declarative:
//!
//! - [`PayloadFields`] patches individual payload fields and re-closes the
//!   block hash, producing a *consistent* payload that differs from what the
//!   producer built.
//! - [`InvalidPayloadField`] names one way to break a payload: a corrupted
//!   header field or a doctored transaction. The mutation is applied and the
//!   hash re-closed, so only the named field is wrong.
//! - [`PayloadCustomizer`], [`FcuCustomizer`] and [`GetPayloadCustomizer`]
//!   wrap the above together with [`VersionShift`]s and the
//!   [`Expectation`] the test holds about the client's response.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod error;
pub use error::CustomizerError;

mod field;
pub use field::FieldOverride;

mod attributes;
pub use attributes::AttributesCustomizer;

mod payload;
pub use payload::PayloadFields;

mod invalid;
pub use invalid::InvalidPayloadField;

mod hashes;
pub use hashes::VersionedHashesCustomizer;

mod call;
pub use call::{
    Expectation, FcuCustomizer, GetPayloadCustomizer, PayloadCustomizer, VersionShift,
};
