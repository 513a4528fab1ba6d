//! Encode/decode contract for the external reference string a gateway
//! echoes back in its webhook. Two wire formats are in circulation:
//!
//! - pipe-delimited: `cls|<customer_id>|<booking_id>` or
//!   `pkg|<customer_id>|<package_type_id>`
//! - base64 of compact JSON (`{"v":1,"c":...,"t":"cls","s":[...]}`) with an
//!   `_<unix_ts>` suffix appended for gateway-side uniqueness
//!
//! Decoding tries the pipe format first, then the base64 form, and fails
//! closed with `MalformedReference` — never a panic.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalReference {
    Class {
        customer_id: Uuid,
        booking_ids: Vec<Uuid>,
    },
    Package {
        customer_id: Uuid,
        package_type_id: Uuid,
    },
}

#[derive(Serialize, Deserialize)]
struct CompactBlob {
    v: u8,
    c: Uuid,
    t: String,
    s: Vec<Uuid>,
}

/// The simple single-subject form used on outbound invoices.
pub fn encode_pipe(reference: &ExternalReference) -> String {
    match reference {
        ExternalReference::Class {
            customer_id,
            booking_ids,
        } => {
            // Pipe form only carries one booking; multi-attendee invoices
            // use the compact form.
            let first = booking_ids.first().copied().unwrap_or_default();
            format!("cls|{}|{}", customer_id, first)
        }
        ExternalReference::Package {
            customer_id,
            package_type_id,
        } => format!("pkg|{}|{}", customer_id, package_type_id),
    }
}

/// Compact base64-JSON form with a timestamp suffix, for references that
/// must be unique per invoice or carry several booking ids.
pub fn encode_compact(reference: &ExternalReference) -> String {
    let blob = match reference {
        ExternalReference::Class {
            customer_id,
            booking_ids,
        } => CompactBlob {
            v: 1,
            c: *customer_id,
            t: "cls".to_string(),
            s: booking_ids.clone(),
        },
        ExternalReference::Package {
            customer_id,
            package_type_id,
        } => CompactBlob {
            v: 1,
            c: *customer_id,
            t: "pkg".to_string(),
            s: vec![*package_type_id],
        },
    };
    // serde_json on an owned struct cannot fail here
    let json = serde_json::to_string(&blob).unwrap_or_default();
    format!("{}_{}", BASE64.encode(json), Utc::now().timestamp())
}

pub fn decode(raw: &str) -> Result<ExternalReference> {
    if let Some(reference) = try_decode_pipe(raw) {
        return Ok(reference);
    }
    if let Some(reference) = try_decode_compact(raw) {
        return Ok(reference);
    }
    Err(AppError::MalformedReference(format!(
        "undecodable reference: {:?}",
        raw
    )))
}

fn try_decode_pipe(raw: &str) -> Option<ExternalReference> {
    let mut parts = raw.split('|');
    let tag = parts.next()?;
    let customer_id = Uuid::parse_str(parts.next()?).ok()?;
    let subject_id = Uuid::parse_str(parts.next()?).ok()?;
    if parts.next().is_some() {
        return None;
    }
    match tag {
        "cls" => Some(ExternalReference::Class {
            customer_id,
            booking_ids: vec![subject_id],
        }),
        "pkg" => Some(ExternalReference::Package {
            customer_id,
            package_type_id: subject_id,
        }),
        _ => None,
    }
}

fn try_decode_compact(raw: &str) -> Option<ExternalReference> {
    // Strip the `_<timestamp>` suffix before decoding. The base64 alphabet
    // never contains '_', so splitting on the first one is unambiguous.
    let encoded = match raw.split_once('_') {
        Some((prefix, _)) => prefix,
        None => raw,
    };
    let bytes = BASE64.decode(encoded).ok()?;
    let blob: CompactBlob = serde_json::from_slice(&bytes).ok()?;
    if blob.v != 1 {
        return None;
    }
    match blob.t.as_str() {
        "cls" if !blob.s.is_empty() => Some(ExternalReference::Class {
            customer_id: blob.c,
            booking_ids: blob.s,
        }),
        "pkg" if blob.s.len() == 1 => Some(ExternalReference::Package {
            customer_id: blob.c,
            package_type_id: blob.s[0],
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_class_roundtrip() {
        let customer = Uuid::new_v4();
        let booking = Uuid::new_v4();
        let raw = format!("cls|{}|{}", customer, booking);
        let decoded = decode(&raw).unwrap();
        assert_eq!(
            decoded,
            ExternalReference::Class {
                customer_id: customer,
                booking_ids: vec![booking],
            }
        );
    }

    #[test]
    fn pipe_package_roundtrip() {
        let customer = Uuid::new_v4();
        let package_type = Uuid::new_v4();
        let raw = format!("pkg|{}|{}", customer, package_type);
        let decoded = decode(&raw).unwrap();
        assert_eq!(
            decoded,
            ExternalReference::Package {
                customer_id: customer,
                package_type_id: package_type,
            }
        );
    }

    #[test]
    fn compact_multi_booking_roundtrip() {
        let reference = ExternalReference::Class {
            customer_id: Uuid::new_v4(),
            booking_ids: vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()],
        };
        let raw = encode_compact(&reference);
        assert!(raw.contains('_'), "compact form carries a timestamp suffix");
        assert_eq!(decode(&raw).unwrap(), reference);
    }

    #[test]
    fn compact_package_roundtrip() {
        let reference = ExternalReference::Package {
            customer_id: Uuid::new_v4(),
            package_type_id: Uuid::new_v4(),
        };
        let raw = encode_compact(&reference);
        assert_eq!(decode(&raw).unwrap(), reference);
    }

    #[test]
    fn garbage_fails_closed() {
        for raw in [
            "",
            "nonsense",
            "cls|not-a-uuid|also-not",
            "xyz|f4b9|c3d2",
            "!!!!_1699999999",
            "e30_1699999999", // valid base64 of "{}" but wrong schema
        ] {
            let err = decode(raw).unwrap_err();
            assert!(
                matches!(err, crate::error::AppError::MalformedReference(_)),
                "expected MalformedReference for {:?}",
                raw
            );
        }
    }

    #[test]
    fn unknown_version_is_rejected() {
        let json = r#"{"v":2,"c":"00000000-0000-0000-0000-000000000001","t":"cls","s":["00000000-0000-0000-0000-000000000002"]}"#;
        let raw = format!("{}_123", BASE64.encode(json));
        assert!(decode(&raw).is_err());
    }
}
