// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types

use std::fmt;

/// ECS error type
///
/// Structural no-ops (removing an absent component, setting a field on an
/// unknown entity, destroying an unknown id) are silent successes and never
/// reach this type. A directory/row-map disagreement is storage corruption
/// and panics instead of surfacing.
#[derive(Debug, Clone)]
pub enum EcsError {
    /// Unparseable field type token at component definition
    UnknownType(String),

    /// Apply expression references a tag component or non-numeric field
    InvalidOperand(String),

    /// Serialization error
    SerializationError(String),

    /// Deserialization error
    DeserializationError(String),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::UnknownType(token) => write!(f, "Unknown field type: {token}"),
            EcsError::InvalidOperand(msg) => write!(f, "Invalid apply operand: {msg}"),
            EcsError::SerializationError(msg) => write!(f, "Serialization error: {msg}"),
            EcsError::DeserializationError(msg) => write!(f, "Deserialization error: {msg}"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EcsError::UnknownType("f128".to_string());
        assert_eq!(err.to_string(), "Unknown field type: f128");
    }
}
