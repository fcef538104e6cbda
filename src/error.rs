// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for Outpost

use thiserror::Error;

/// Result type alias for Outpost operations
pub type Result<T> = std::result::Result<T, OutpostError>;

/// Errors that can occur during Outpost operations
#[derive(Error, Debug)]
pub enum OutpostError {
    /// A required positional argument was missing or empty
    #[error("{usage}")]
    Usage { usage: String },

    /// A required file or variable is absent
    #[error("Missing configuration: {message}")]
    MissingConfiguration { message: String },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration format
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// External command exited unsuccessfully
    #[error("Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    /// Descriptor file could not be parsed
    #[error("Failed to parse descriptor '{path}': {message}")]
    DescriptorParse { path: String, message: String },

    /// Two declarations share an address
    #[error("Duplicate declaration: {address}")]
    DuplicateDeclaration { address: String },

    /// Two declarations render to the same engine block
    #[error("{first} and {second} both render as {engine_address}")]
    EngineAddressClash {
        engine_address: String,
        first: String,
        second: String,
    },

    /// A declaration name the engine cannot address
    #[error("Invalid name '{name}' for {kind}: names must match [A-Za-z_][A-Za-z0-9_-]*")]
    InvalidName { kind: String, name: String },

    /// A reference string is not of the form type.name.attribute
    #[error("Malformed reference '{reference}' in {address}")]
    MalformedReference { address: String, reference: String },

    /// A reference points at an address that is not declared
    #[error("{address} references undeclared {target}")]
    DanglingReference { address: String, target: String },

    /// References form a cycle
    #[error("Reference cycle between: {}", members.join(", "))]
    ReferenceCycle { members: Vec<String> },

    /// A declaration's provider namespace has no binding
    #[error("No provider bound for namespace '{namespace}' (needed by {address})")]
    UnboundNamespace { namespace: String, address: String },

    /// Object-storage API request failed
    #[error("Object storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Object-storage bucket lookup failed
    #[error("No matching bucket found: {cluster}/{bucket}")]
    BucketNotFound { cluster: String, bucket: String },

    /// Certificate authority rejected a step
    #[error("ACME {step} failed: {message}")]
    AcmeFailed { step: String, message: String },

    /// ACME protocol error
    #[error("ACME error: {0}")]
    Acme(#[from] instant_acme::Error),

    /// Key or CSR generation failed
    #[error("Certificate generation failed: {0}")]
    CertificateGeneration(#[from] rcgen::Error),

    /// IO error wrapper
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl OutpostError {
    /// Whether the message is meant for standard output rather than the log
    pub fn is_usage(&self) -> bool {
        matches!(self, OutpostError::Usage { .. })
    }
}
