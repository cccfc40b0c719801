//! The status table.
//!
//! Every outcome of a call carries two codes: the domain [`Code`] and the
//! transport (HTTP) status code. The mapping between the two is the fixed
//! table below and nothing else.

use std::fmt;
use std::str::FromStr;

use http::StatusCode;
use serde::{Serialize, Serializer};

/// Domain status codes, numbered as in the gRPC status space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

struct Entry {
    code: Code,
    name: &'static str,
    transport: Option<StatusCode>,
}

const fn entry(code: Code, name: &'static str, transport: Option<StatusCode>) -> Entry {
    Entry {
        code,
        name,
        transport,
    }
}

// Indexed by `Code as usize`.
const STATUS_TABLE: [Entry; 17] = [
    entry(Code::Ok, "OK", Some(StatusCode::OK)),
    entry(Code::Cancelled, "Cancelled", None),
    entry(Code::Unknown, "Unknown", Some(StatusCode::INTERNAL_SERVER_ERROR)),
    entry(Code::InvalidArgument, "InvalidArgument", Some(StatusCode::BAD_REQUEST)),
    entry(Code::DeadlineExceeded, "DeadlineExceeded", Some(StatusCode::REQUEST_TIMEOUT)),
    entry(Code::NotFound, "NotFound", Some(StatusCode::NOT_FOUND)),
    entry(Code::AlreadyExists, "AlreadyExists", Some(StatusCode::CONFLICT)),
    entry(Code::PermissionDenied, "PermissionDenied", Some(StatusCode::FORBIDDEN)),
    entry(Code::ResourceExhausted, "ResourceExhausted", Some(StatusCode::FORBIDDEN)),
    entry(Code::FailedPrecondition, "FailedPrecondition", Some(StatusCode::PRECONDITION_FAILED)),
    entry(Code::Aborted, "Aborted", Some(StatusCode::CONFLICT)),
    entry(Code::OutOfRange, "OutOfRange", Some(StatusCode::BAD_REQUEST)),
    entry(Code::Unimplemented, "Unimplemented", Some(StatusCode::NOT_IMPLEMENTED)),
    entry(Code::Internal, "Internal", Some(StatusCode::INTERNAL_SERVER_ERROR)),
    entry(Code::Unavailable, "Unavailable", Some(StatusCode::SERVICE_UNAVAILABLE)),
    entry(Code::DataLoss, "DataLoss", Some(StatusCode::INTERNAL_SERVER_ERROR)),
    entry(Code::Unauthenticated, "Unauthenticated", Some(StatusCode::UNAUTHORIZED)),
];

impl Code {
    /// All codes in numeric order.
    pub const ALL: [Code; 17] = [
        Code::Ok,
        Code::Cancelled,
        Code::Unknown,
        Code::InvalidArgument,
        Code::DeadlineExceeded,
        Code::NotFound,
        Code::AlreadyExists,
        Code::PermissionDenied,
        Code::ResourceExhausted,
        Code::FailedPrecondition,
        Code::Aborted,
        Code::OutOfRange,
        Code::Unimplemented,
        Code::Internal,
        Code::Unavailable,
        Code::DataLoss,
        Code::Unauthenticated,
    ];

    fn entry(self) -> &'static Entry {
        &STATUS_TABLE[self as usize]
    }

    /// Symbolic name used in JSON error bodies (e.g. `"InvalidArgument"`).
    pub fn name(self) -> &'static str {
        self.entry().name
    }

    /// Transport status code for this domain status.
    ///
    /// `Cancelled` has no entry in the table and returns `None`.
    pub fn http_status(self) -> Option<StatusCode> {
        self.entry().transport
    }

    /// Numeric value written to the `Status` header.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Look up a code by its numeric value.
    pub fn from_i32(value: i32) -> Option<Code> {
        usize::try_from(value)
            .ok()
            .and_then(|idx| STATUS_TABLE.get(idx))
            .map(|entry| entry.code)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing a [`Code`] from a string fails.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown status name: {0}")]
pub struct ParseCodeError(String);

impl FromStr for Code {
    type Err = ParseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // American spelling is accepted as an alias.
        if s == "Canceled" {
            return Ok(Code::Cancelled);
        }
        STATUS_TABLE
            .iter()
            .find(|entry| entry.name == s)
            .map(|entry| entry.code)
            .ok_or_else(|| ParseCodeError(s.to_string()))
    }
}

impl Serialize for Code {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_indexed_by_code() {
        for code in Code::ALL {
            assert_eq!(STATUS_TABLE[code as usize].code, code);
            assert_eq!(Code::from_i32(code.as_i32()), Some(code));
        }
        assert_eq!(Code::from_i32(17), None);
        assert_eq!(Code::from_i32(-1), None);
    }

    #[test]
    fn test_transport_codes() {
        let expected: [(Code, Option<u16>); 17] = [
            (Code::Ok, Some(200)),
            (Code::Cancelled, None),
            (Code::Unknown, Some(500)),
            (Code::InvalidArgument, Some(400)),
            (Code::DeadlineExceeded, Some(408)),
            (Code::NotFound, Some(404)),
            (Code::AlreadyExists, Some(409)),
            (Code::PermissionDenied, Some(403)),
            (Code::ResourceExhausted, Some(403)),
            (Code::FailedPrecondition, Some(412)),
            (Code::Aborted, Some(409)),
            (Code::OutOfRange, Some(400)),
            (Code::Unimplemented, Some(501)),
            (Code::Internal, Some(500)),
            (Code::Unavailable, Some(503)),
            (Code::DataLoss, Some(500)),
            (Code::Unauthenticated, Some(401)),
        ];
        for (code, transport) in expected {
            assert_eq!(code.http_status().map(|s| s.as_u16()), transport, "{code}");
        }
    }

    #[test]
    fn test_unavailable_keeps_its_own_status() {
        assert_eq!(Code::Unavailable.as_i32(), 14);
        assert_ne!(Code::Unavailable.as_i32(), Code::Unauthenticated.as_i32());
        assert_eq!(Code::Unavailable.http_status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[test]
    fn test_name_round_trip() {
        for code in Code::ALL {
            assert_eq!(code.name().parse::<Code>(), Ok(code));
        }
        assert_eq!("Canceled".parse::<Code>(), Ok(Code::Cancelled));
        assert!("invalid_argument".parse::<Code>().is_err());
    }

    #[test]
    fn test_serialize_as_name() {
        let json = serde_json::to_string(&Code::InvalidArgument).unwrap();
        assert_eq!(json, "\"InvalidArgument\"");
    }
}
