//! # Stream whitelist
//!
//! A whitelist is a list of stream patterns of the form `net.sta.loc.cha`, where each code
//! may use shell glob syntax (`*`, `?`, `[...]`). Not all fields need to be given; missing
//! fields are treated as wildcards:
//!
//! ```text
//! IU                 -> IU.*.*.*       every stream of the IU network
//! GE.FALKS           -> GE.FALKS.*.*   every stream of station GE.FALKS
//! GE.FALKS.          -> GE.FALKS.--.*  only the empty location code
//! ```
//!
//! Items are separated by whitespace or newlines. Lines starting with `#` are comments.
//!
//! ```rust
//! use octoloc::stations::whitelist::StreamWhitelist;
//! use octoloc::stations::StreamId;
//!
//! let whitelist = StreamWhitelist::from_text("C C1 CX\n# comment\nGT.LPAZ\n").unwrap();
//! assert_eq!(whitelist.items(), ["C.*.*.*", "C1.*.*.*", "CX.*.*.*", "GT.LPAZ.*.*"]);
//! assert!(whitelist.matches(&StreamId::new("GT", "LPAZ", "00", "BHZ")));
//! assert!(!whitelist.matches(&StreamId::new("GT", "BOSA", "00", "BHZ")));
//! ```
//!
//! Matching is case sensitive. An empty location code is rendered as `--` before matching.
use camino::Utf8Path;
use nom::{
    bytes::complete::take_while1, character::complete::multispace0, multi::many0,
    sequence::preceded, IResult, Parser,
};
use regex::Regex;

use crate::{
    octoloc_errors::OctolocError,
    stations::{StationKey, StreamId},
};

/// Compiled stream whitelist.
#[derive(Debug, Clone)]
pub struct StreamWhitelist {
    items: Vec<String>,
    stream_patterns: Vec<Regex>,
    station_patterns: Vec<Regex>,
}

/// Translate a shell glob into an anchored regular expression.
///
/// Supports `*`, `?` and bracket classes (`[abc]`, `[a-z]`, `[!abc]`). An unterminated
/// bracket is taken literally.
///
/// Arguments
/// -----------------
/// * `glob`: the glob pattern.
///
/// Return
/// ----------
/// * The compiled [`Regex`] or [`OctolocError::InvalidPattern`].
pub fn compile_glob(glob: &str) -> Result<Regex, OctolocError> {
    let chars: Vec<char> = glob.chars().collect();
    let mut re = String::with_capacity(glob.len() * 2 + 2);
    re.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => match chars[i + 1..].iter().position(|&c| c == ']') {
                Some(rel) if rel > 0 => {
                    let class: String = chars[i + 1..i + 1 + rel].iter().collect();
                    re.push('[');
                    match class.strip_prefix('!') {
                        Some(rest) => {
                            re.push('^');
                            re.push_str(&class_escape(rest));
                        }
                        None => re.push_str(&class_escape(&class)),
                    }
                    re.push(']');
                    i += rel + 1;
                }
                _ => re.push_str(r"\["),
            },
            c => re.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    re.push('$');
    Ok(Regex::new(&re)?)
}

// Inside a class only '\', '[' , ']' and '^' need protection; '-' keeps its range meaning.
fn class_escape(class: &str) -> String {
    class
        .chars()
        .map(|c| match c {
            '\\' | '[' | ']' | '^' => format!("\\{c}"),
            c => c.to_string(),
        })
        .collect()
}

fn parse_items(line: &str) -> IResult<&str, Vec<&str>> {
    many0(preceded(
        multispace0,
        take_while1(|c: char| !c.is_whitespace()),
    ))
    .parse(line)
}

/// Expand a raw item to the normalised four-field form.
fn normalise_item(item: &str) -> String {
    let mut fields: Vec<String> = item.split('.').map(|t| t.trim().to_string()).collect();
    fields.extend(["*", "*", "*"].map(String::from));
    fields.truncate(4);
    if fields[2].is_empty() {
        fields[2] = "--".to_string();
    }
    fields.join(".")
}

impl StreamWhitelist {
    /// Build a whitelist from its text representation.
    ///
    /// Return
    /// ----------
    /// * The compiled whitelist, or [`OctolocError::WhitelistParsing`] /
    ///   [`OctolocError::InvalidPattern`] on malformed input.
    pub fn from_text(text: &str) -> Result<Self, OctolocError> {
        let mut items = Vec::new();
        for line in text.trim().lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (rest, tokens) =
                parse_items(line).map_err(|_| OctolocError::WhitelistParsing(line.to_string()))?;
            if !rest.trim().is_empty() {
                return Err(OctolocError::WhitelistParsing(line.to_string()));
            }
            items.extend(tokens.into_iter().map(normalise_item));
        }

        let stream_patterns = items
            .iter()
            .map(|item| compile_glob(item))
            .collect::<Result<Vec<_>, _>>()?;

        let station_patterns = items
            .iter()
            .map(|item| {
                let nsl: Vec<&str> = item.splitn(4, '.').take(3).collect();
                compile_glob(&nsl.join("."))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StreamWhitelist {
            items,
            stream_patterns,
            station_patterns,
        })
    }

    /// Read and compile a whitelist file.
    pub fn from_file(path: &Utf8Path) -> Result<Self, OctolocError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_text(&text)
    }

    /// The normalised items (`net.sta.loc.cha`).
    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether a stream matches any item.
    pub fn matches(&self, stream: &StreamId) -> bool {
        let location = if stream.location.is_empty() {
            "--"
        } else {
            stream.location.as_str()
        };
        let code = format!(
            "{}.{}.{}.{}",
            stream.network, stream.station, location, stream.channel
        );
        self.stream_patterns.iter().any(|re| re.is_match(&code))
    }

    /// Whether any stream of a sensor location may match, i.e. the channel field is
    /// disregarded. Used when the station catalog is built from an inventory.
    pub fn matches_station(&self, key: &StationKey) -> bool {
        let location = if key.location.is_empty() {
            "--"
        } else {
            key.location.as_str()
        };
        let code = format!("{}.{}.{}", key.network, key.station, location);
        self.station_patterns.iter().any(|re| re.is_match(&code))
    }
}
