//! Data models representing database entities and API payloads.

/// API key model
pub mod api_key;
/// JSON-RPC envelopes for the protocol gateway
pub mod jsonrpc;
/// One-time login codes
pub mod one_time_code;
/// Refresh token records
pub mod refresh_token;
/// Signing keys and JWKs
pub mod signing_key;
/// Session token format
pub mod token;
/// Typed tool invocations
pub mod tool;
/// Usage metering
pub mod usage;
/// Users
pub mod user;
