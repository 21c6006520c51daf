//! Reply parsing: raw bot text to named fields.

use regex::Regex;
use std::collections::BTreeMap;

/// Field emitted when nothing recognizable was found.
pub const RAW_RESPONSE_FIELD: &str = "raw_response";

/// Turns reply text into named fields. Pure and infallible.
pub trait ResponseParser: Send + Sync {
    fn parse(&self, raw: &str) -> BTreeMap<String, String>;
}

/// Labels recognized in a FAM lookup reply, in extraction order.
const FAM_FIELDS: &[(&str, &str)] = &[
    ("fam_id", "FAM ID"),
    ("name", "NAME"),
    ("phone", "PHONE"),
    ("type", "TYPE"),
    ("upi", "UPI"),
    ("bank", "BANK"),
    ("account", "ACCOUNT"),
    ("ifsc", "IFSC"),
    ("status", "STATUS"),
    ("timestamp", "TIMESTAMP"),
];

/// Label-driven parser for FAM replies.
///
/// Each field takes the rest of the line after the first occurrence of its
/// label (case-insensitive, optional colon) that carries a value, trimmed. Labels may appear
/// anywhere on a line, so `UPI` also matches inside `UPI ID:`.
pub struct FamResponseParser {
    patterns: Vec<(&'static str, Regex)>,
}

impl FamResponseParser {
    pub fn new() -> Result<Self, regex::Error> {
        let patterns = FAM_FIELDS
            .iter()
            .map(|(field, label)| {
                Regex::new(&format!(r"(?im){}[ \t]*:?[ \t]*(.*)", regex::escape(label)))
                    .map(|re| (*field, re))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }
}

impl ResponseParser for FamResponseParser {
    fn parse(&self, raw: &str) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();

        for (field, re) in &self.patterns {
            let value = re
                .captures_iter(raw)
                .filter_map(|caps| caps.get(1))
                .map(|m| m.as_str().trim())
                .find(|v| !v.is_empty());
            if let Some(value) = value {
                fields.insert((*field).to_string(), value.to_string());
            }
        }

        if fields.is_empty() {
            fields.insert(RAW_RESPONSE_FIELD.to_string(), raw.trim().to_string());
        }
        fields
    }
}
