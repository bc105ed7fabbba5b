//! Integration tests for Layer 0: Foundation
//!
//! Tests for values, column casts, raw payloads, digests, and errors.

mod columns;
mod errors;
mod values;
