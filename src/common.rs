use ascii::{AsciiStr, AsciiString};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Status code of a response.
#[derive(Eq, PartialEq, Copy, Clone, Debug, Ord, PartialOrd)]
pub struct StatusCode(pub u16);

impl StatusCode {
    /// Returns the status code as a number.
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    pub fn equiv(&self, other: &u16) -> bool {
        self.0 == *other
    }

    /// True for codes whose responses never carry a body (1xx, 204, 304).
    pub fn bodyless(&self) -> bool {
        matches!(self.0, 100..=199 | 204 | 304)
    }
}

impl From<u16> for StatusCode {
    fn from(in_code: u16) -> StatusCode {
        StatusCode(in_code)
    }
}

impl Display for StatusCode {
    fn fmt(&self, formatter: &mut Formatter) -> Result<(), fmt::Error> {
        write!(formatter, "{}", self.0)
    }
}

/// Represents a HTTP header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub field: HeaderField,
    pub value: AsciiString,
}

impl Header {
    /// Builds a `Header` from two `Vec<u8>`s or two `&[u8]`s.
    ///
    /// Example:
    ///
    /// ```
    /// let header = wirecall::Header::from_bytes(&b"Content-Type"[..], &b"text/plain"[..]).unwrap();
    /// ```
    pub fn from_bytes<B1, B2>(header: B1, value: B2) -> Result<Header, ()>
    where
        B1: Into<Vec<u8>> + AsRef<[u8]>,
        B2: Into<Vec<u8>> + AsRef<[u8]>,
    {
        let header = HeaderField::from_bytes(header).or(Err(()))?;
        let value = AsciiString::from_ascii(value).or(Err(()))?;

        Ok(Header { field: header, value })
    }
}

impl FromStr for Header {
    type Err = ();

    fn from_str(input: &str) -> Result<Header, ()> {
        let mut elems = input.splitn(2, ':');

        let field = elems.next();
        let value = elems.next();

        let (field, value) = match (field, value) {
            (Some(f), Some(v)) => (f, v),
            _ => return Err(()),
        };

        let field = field.parse()?;

        let value = match AsciiStr::from_ascii(value.trim()) {
            Ok(v) => v.to_ascii_string(),
            Err(_) => return Err(()),
        };

        Ok(Header { field, value })
    }
}

impl Display for Header {
    fn fmt(&self, formatter: &mut Formatter) -> Result<(), fmt::Error> {
        write!(formatter, "{}: {}", self.field, self.value.as_str())
    }
}

/// Field of a header (eg. `Content-Type`, `Content-Length`, etc.)
///
/// Comparison between two `HeaderField`s ignores case.
#[derive(Debug, Clone)]
pub struct HeaderField(AsciiString);

impl HeaderField {
    pub fn from_bytes<B>(bytes: B) -> Result<HeaderField, B>
    where
        B: Into<Vec<u8>> + AsRef<[u8]>,
    {
        AsciiString::from_ascii(bytes)
            .map(HeaderField)
            .map_err(|err| err.into_source())
    }

    pub fn as_str(&self) -> &AsciiStr {
        &self.0
    }

    pub fn equiv(&self, other: &str) -> bool {
        other.eq_ignore_ascii_case(self.as_str().as_str())
    }
}

impl FromStr for HeaderField {
    type Err = ();

    fn from_str(s: &str) -> Result<HeaderField, ()> {
        AsciiStr::from_ascii(s.trim())
            .map(|s| HeaderField(s.to_ascii_string()))
            .map_err(|_| ())
    }
}

impl Display for HeaderField {
    fn fmt(&self, formatter: &mut Formatter) -> Result<(), fmt::Error> {
        write!(formatter, "{}", self.0.as_str())
    }
}

impl PartialEq for HeaderField {
    fn eq(&self, other: &HeaderField) -> bool {
        self.as_str().eq_ignore_ascii_case(other.as_str())
    }
}

impl Eq for HeaderField {}

/// An ordered collection of headers.
///
/// Emission order matches insertion order. Lookups by field name ignore
/// case. A field may appear several times; repeated entries are emitted as
/// repeated header lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<Header>,
}

impl Headers {
    pub fn new() -> Headers {
        Headers {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the value of the first header matching `field`, if any.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.field.equiv(field))
            .map(|h| h.value.as_str())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.entries.iter().any(|h| h.field.equiv(field))
    }

    /// Appends a header, keeping any existing entries for the same field.
    pub fn push(&mut self, header: Header) {
        self.entries.push(header);
    }

    /// Replaces every entry for the header's field with this single one.
    pub fn replace(&mut self, header: Header) {
        self.entries.retain(|h| h.field != header.field);
        self.entries.push(header);
    }

    /// Removes every entry for `field`.
    pub fn remove(&mut self, field: &str) {
        self.entries.retain(|h| !h.field.equiv(field));
    }

    /// Folds a parsed response header in: a repeated field extends the
    /// existing value with `, `, preserving insertion order.
    pub(crate) fn append_joined(&mut self, header: Header) {
        match self
            .entries
            .iter_mut()
            .find(|h| h.field == header.field)
        {
            Some(existing) => {
                existing.value.push_str(AsciiStr::from_ascii(b", ").unwrap());
                existing.value.push_str(&header.value);
            }
            None => self.entries.push(header),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.entries.iter()
    }

    /// Copy with credential-bearing values blanked, for printable forms.
    pub(crate) fn redacted(&self) -> Headers {
        let mut copy = self.clone();
        for header in copy.entries.iter_mut() {
            if header.field.equiv("Authorization") || header.field.equiv("Proxy-Authorization") {
                header.value = AsciiStr::from_ascii(b"REDACTED").unwrap().to_ascii_string();
            }
        }
        copy
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl IntoIterator for Headers {
    type Item = Header;
    type IntoIter = std::vec::IntoIter<Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// HTTP method (eg. `GET`, `POST`, etc.)
///
/// Parsing ignores case; standard verbs are always emitted uppercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
    NonStandard(AsciiString),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
            Method::NonStandard(s) => s.as_str(),
        }
    }

    pub fn equiv(&self, other: &str) -> bool {
        other.eq_ignore_ascii_case(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Method, ()> {
        let method = match s.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "CONNECT" => Method::Connect,
            "OPTIONS" => Method::Options,
            "TRACE" => Method::Trace,
            "PATCH" => Method::Patch,
            other => Method::NonStandard(AsciiString::from_ascii(other).map_err(|_| ())?),
        };
        Ok(method)
    }
}

impl Display for Method {
    fn fmt(&self, formatter: &mut Formatter) -> Result<(), fmt::Error> {
        write!(formatter, "{}", self.as_str())
    }
}
