//! Filter-list files (`.ifl`): parsing and serialization.
//!
//! A list is stored as INI text. The `[info]` section names the list and
//! declares how many filters follow; each filter has its own
//! `[imageFilterN]` section (numbered from 1) holding its id, bypass
//! flag, and parameters:
//!
//! ```text
//! [info]
//! name=Warm fade
//! description=Lifted blacks
//! fileType=tonestack.imagefilterlist
//! nFilters=1
//!
//! [imageFilter1]
//! id=tonestack.filter.curves
//! bypass=false
//! workingchannel=luma
//! lumaknots=0.00 0.10, 1.00 1.00
//! ```
//!
//! This module is sans-IO: it converts between text and
//! [`FilterListDocument`]. Instantiating filters from a document is the
//! job of [`FilterList::load`](crate::FilterList::load).

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::filter::{ParameterStore, parse_bool};

/// Value of `fileType` in the `[info]` section.
pub const FILE_TYPE: &str = "tonestack.imagefilterlist";

/// Conventional file extension, without the dot.
pub const FILE_EXTENSION: &str = "ifl";

const INFO_SECTION: &str = "info";
const FILTER_SECTION_PREFIX: &str = "imageFilter";

/// Errors from parsing a filter-list document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterListError {
    /// A line was neither a section header, a `key=value` pair, a
    /// comment, nor blank.
    #[error("line {line}: cannot parse {content:?}")]
    Syntax {
        /// 1-based line number.
        line: usize,
        /// Offending line.
        content: String,
    },

    /// A `key=value` pair appeared before any section header.
    #[error("line {line}: key outside of any section")]
    KeyOutsideSection {
        /// 1-based line number.
        line: usize,
    },

    /// A section header appeared twice.
    #[error("line {line}: duplicate section [{section}]")]
    DuplicateSection {
        /// 1-based line number.
        line: usize,
        /// Section name.
        section: String,
    },

    /// There was no `[info]` section.
    #[error("missing [info] section")]
    MissingInfo,

    /// `fileType` was absent or named another format.
    #[error("not a filter list (fileType {found:?})")]
    FileType {
        /// Value found, if any.
        found: Option<String>,
    },

    /// `nFilters` was absent or not a non-negative integer.
    #[error("invalid nFilters value {value:?}")]
    FilterCount {
        /// Raw value.
        value: String,
    },

    /// `nFilters` disagreed with the number of filter sections.
    #[error("nFilters declares {declared} filters but {found} filter sections are present")]
    CountMismatch {
        /// Declared count.
        declared: usize,
        /// Sections present.
        found: usize,
    },

    /// A filter section in `1..=nFilters` was absent.
    #[error("missing section [imageFilter{index}]")]
    MissingFilterSection {
        /// 1-based filter number.
        index: usize,
    },

    /// A filter section had no `id` key.
    #[error("section [{section}] has no filter id")]
    MissingId {
        /// Section name.
        section: String,
    },

    /// A filter section's `bypass` was not a boolean.
    #[error("section [{section}] has invalid bypass value {value:?}")]
    InvalidBypass {
        /// Section name.
        section: String,
        /// Raw value.
        value: String,
    },
}

/// One stage as stored in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterEntry {
    pub id: String,
    pub bypass: bool,
    /// Every key of the section except `id` and `bypass`.
    pub parameters: ParameterStore,
}

/// A parsed filter-list file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterListDocument {
    pub name: String,
    pub description: String,
    pub filters: Vec<FilterEntry>,
}

impl FilterListDocument {
    /// Parse `.ifl` text.
    ///
    /// Lines starting with `;` or `#` are comments. Values may be wrapped
    /// in double quotes, which are stripped. Unknown sections are ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`FilterListError`] describing the first structural
    /// problem found.
    pub fn parse(text: &str) -> Result<Self, FilterListError> {
        let sections = parse_sections(text)?;

        let info = sections
            .get(INFO_SECTION)
            .ok_or(FilterListError::MissingInfo)?;
        match info.get("fileType") {
            Some(FILE_TYPE) => {}
            found => {
                return Err(FilterListError::FileType {
                    found: found.map(str::to_owned),
                });
            }
        }
        let count_value = info.get("nFilters").unwrap_or_default();
        let declared: usize =
            count_value
                .trim()
                .parse()
                .map_err(|_| FilterListError::FilterCount {
                    value: count_value.to_owned(),
                })?;

        let found = sections
            .keys()
            .filter(|name| filter_section_number(name).is_some())
            .count();
        if found != declared {
            return Err(FilterListError::CountMismatch { declared, found });
        }

        let mut filters = Vec::with_capacity(declared);
        for index in 1..=declared {
            let section = format!("{FILTER_SECTION_PREFIX}{index}");
            let values = sections
                .get(&section)
                .ok_or(FilterListError::MissingFilterSection { index })?;
            filters.push(parse_entry(&section, values)?);
        }

        Ok(Self {
            name: info.get("name").unwrap_or_default().to_owned(),
            description: info.get("description").unwrap_or_default().to_owned(),
            filters,
        })
    }

    /// Serialize to `.ifl` text accepted by [`parse`](Self::parse).
    #[must_use]
    pub fn to_ifl_string(&self) -> String {
        let mut out = String::new();
        out.push_str("[info]\n");
        write_pair(&mut out, "name", &self.name);
        write_pair(&mut out, "description", &self.description);
        write_pair(&mut out, "fileType", FILE_TYPE);
        write_pair(&mut out, "nFilters", &self.filters.len().to_string());
        for (i, entry) in self.filters.iter().enumerate() {
            let _ = writeln!(out, "\n[{FILTER_SECTION_PREFIX}{}]", i + 1);
            write_pair(&mut out, "id", &entry.id);
            write_pair(&mut out, "bypass", if entry.bypass { "true" } else { "false" });
            for (key, value) in entry.parameters.iter() {
                write_pair(&mut out, key, value);
            }
        }
        out
    }
}

impl std::str::FromStr for FilterListDocument {
    type Err = FilterListError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_sections(text: &str) -> Result<BTreeMap<String, ParameterStore>, FilterListError> {
    let mut sections: BTreeMap<String, ParameterStore> = BTreeMap::new();
    let mut current: Option<String> = None;
    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[') {
            let name = header
                .strip_suffix(']')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| FilterListError::Syntax {
                    line: line_no,
                    content: raw.to_owned(),
                })?;
            if sections.contains_key(name) {
                return Err(FilterListError::DuplicateSection {
                    line: line_no,
                    section: name.to_owned(),
                });
            }
            if name != INFO_SECTION && filter_section_number(name).is_none() {
                log::debug!("ignoring unknown section [{name}] on line {line_no}");
            }
            sections.insert(name.to_owned(), ParameterStore::new());
            current = Some(name.to_owned());
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .filter(|(k, _)| !k.trim().is_empty())
            .ok_or_else(|| FilterListError::Syntax {
                line: line_no,
                content: raw.to_owned(),
            })?;
        let store = current
            .as_ref()
            .and_then(|name| sections.get_mut(name))
            .ok_or(FilterListError::KeyOutsideSection { line: line_no })?;
        store.set(key.trim(), unescape(unquote(value.trim())));
    }
    Ok(sections)
}

fn filter_section_number(name: &str) -> Option<usize> {
    name.strip_prefix(FILTER_SECTION_PREFIX)
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
        .filter(|&n: &usize| n >= 1)
}

fn parse_entry(section: &str, values: &ParameterStore) -> Result<FilterEntry, FilterListError> {
    let id = values
        .get("id")
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| FilterListError::MissingId {
            section: section.to_owned(),
        })?;
    let bypass = match values.get("bypass") {
        None => false,
        Some(value) => parse_bool(value).ok_or_else(|| FilterListError::InvalidBypass {
            section: section.to_owned(),
            value: value.to_owned(),
        })?,
    };
    let parameters = values
        .iter()
        .filter(|(k, _)| *k != "id" && *k != "bypass")
        .collect();
    Ok(FilterEntry {
        id: id.trim().to_owned(),
        bypass,
        parameters,
    })
}

fn write_pair(out: &mut String, key: &str, value: &str) {
    let escaped = escape(value);
    let needs_quotes = escaped != escaped.trim()
        || escaped.starts_with('"')
        || escaped.starts_with(';')
        || escaped.starts_with('#');
    if needs_quotes {
        let _ = writeln!(out, "{key}=\"{escaped}\"");
    } else {
        let _ = writeln!(out, "{key}={escaped}");
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
; saved by tonestack
[info]
name=Warm fade
description=\"  padded  \"
fileType=tonestack.imagefilterlist
nFilters=2

[imageFilter1]
id=tonestack.filter.curves
bypass=false
workingchannel=luma
lumaknots=0.00 0.10, 1.00 1.00

[imageFilter2]
id=tonestack.filter.hslkeyer
bypass=true
";

    #[test]
    fn parses_sample() {
        let doc = FilterListDocument::parse(SAMPLE).unwrap();
        assert_eq!(doc.name, "Warm fade");
        assert_eq!(doc.description, "  padded  ");
        assert_eq!(doc.filters.len(), 2);
        assert_eq!(doc.filters[0].id, "tonestack.filter.curves");
        assert!(!doc.filters[0].bypass);
        assert_eq!(
            doc.filters[0].parameters.get("lumaknots"),
            Some("0.00 0.10, 1.00 1.00")
        );
        assert!(doc.filters[0].parameters.get("id").is_none());
        assert!(doc.filters[1].bypass);
        assert!(doc.filters[1].parameters.is_empty());
    }

    #[test]
    fn from_str_matches_parse() {
        let doc: FilterListDocument = SAMPLE.parse().unwrap();
        assert_eq!(doc, FilterListDocument::parse(SAMPLE).unwrap());
        assert!("name=x\n".parse::<FilterListDocument>().is_err());
    }

    #[test]
    fn serialization_round_trips() {
        let doc = FilterListDocument::parse(SAMPLE).unwrap();
        let text = doc.to_ifl_string();
        assert_eq!(FilterListDocument::parse(&text).unwrap(), doc);
    }

    #[test]
    fn multiline_description_survives() {
        let doc = FilterListDocument {
            name: "n".into(),
            description: "line one\nline two \\ done".into(),
            filters: Vec::new(),
        };
        let parsed = FilterListDocument::parse(&doc.to_ifl_string()).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn empty_list_is_valid() {
        let text = "[info]\nfileType=tonestack.imagefilterlist\nnFilters=0\n";
        let doc = FilterListDocument::parse(text).unwrap();
        assert!(doc.filters.is_empty());
        assert!(doc.name.is_empty());
    }

    #[test]
    fn missing_info_is_rejected() {
        let text = "[imageFilter1]\nid=x\n";
        assert_eq!(
            FilterListDocument::parse(text),
            Err(FilterListError::MissingInfo)
        );
    }

    #[test]
    fn wrong_file_type_is_rejected() {
        let text = "[info]\nfileType=something.else\nnFilters=0\n";
        assert!(matches!(
            FilterListDocument::parse(text),
            Err(FilterListError::FileType { found: Some(_) })
        ));
    }

    #[test]
    fn bad_count_is_rejected() {
        let text = "[info]\nfileType=tonestack.imagefilterlist\nnFilters=two\n";
        assert!(matches!(
            FilterListDocument::parse(text),
            Err(FilterListError::FilterCount { .. })
        ));
    }

    #[test]
    fn count_mismatch_is_rejected() {
        let text = "[info]\nfileType=tonestack.imagefilterlist\nnFilters=2\n[imageFilter1]\nid=a\n";
        assert_eq!(
            FilterListDocument::parse(text),
            Err(FilterListError::CountMismatch {
                declared: 2,
                found: 1
            })
        );
    }

    #[test]
    fn gap_in_numbering_is_rejected() {
        let text = "[info]\nfileType=tonestack.imagefilterlist\nnFilters=2\n[imageFilter1]\nid=a\n[imageFilter3]\nid=b\n";
        assert_eq!(
            FilterListDocument::parse(text),
            Err(FilterListError::MissingFilterSection { index: 2 })
        );
    }

    #[test]
    fn missing_id_is_rejected() {
        let text = "[info]\nfileType=tonestack.imagefilterlist\nnFilters=1\n[imageFilter1]\nbypass=false\n";
        assert!(matches!(
            FilterListDocument::parse(text),
            Err(FilterListError::MissingId { .. })
        ));
    }

    #[test]
    fn non_bool_bypass_is_rejected() {
        let text = "[info]\nfileType=tonestack.imagefilterlist\nnFilters=1\n[imageFilter1]\nid=a\nbypass=maybe\n";
        assert!(matches!(
            FilterListDocument::parse(text),
            Err(FilterListError::InvalidBypass { .. })
        ));
    }

    #[test]
    fn garbage_line_is_rejected() {
        let text = "[info]\nthis is not a pair\n";
        assert!(matches!(
            FilterListDocument::parse(text),
            Err(FilterListError::Syntax { line: 2, .. })
        ));
    }

    #[test]
    fn key_before_section_is_rejected() {
        assert_eq!(
            FilterListDocument::parse("name=x\n"),
            Err(FilterListError::KeyOutsideSection { line: 1 })
        );
    }

    #[test]
    fn duplicate_section_is_rejected() {
        let text = "[info]\n[info]\n";
        assert!(matches!(
            FilterListDocument::parse(text),
            Err(FilterListError::DuplicateSection { line: 2, .. })
        ));
    }
}
