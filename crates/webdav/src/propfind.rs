//! PROPFIND multistatus parsing
//!
//! Element names are matched on their lowercased local name, so `D:href`,
//! `d:HREF` and an unprefixed `href` in the `DAV:` namespace all count.

use jiff::Timestamp;
use jiff::fmt::rfc2822::DateTimeParser;
use quick_xml::Reader;
use quick_xml::events::Event;
use url::Url;

use ca_core::{Error, Result};

/// Request body asking for the three properties the client maps
pub(crate) const PROPFIND_BODY: &str = "<d:propfind xmlns:d=\"DAV:\">\n\
<d:prop>\n\
<d:resourcetype />\n\
<d:getcontentlength />\n\
<d:getlastmodified />\n\
</d:prop>\n\
</d:propfind>";

static DATE_PARSER: DateTimeParser = DateTimeParser::new();

/// Value of the `Depth` header on a PROPFIND request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PropfindDepth {
    Zero,
    One,
    Infinity,
}

impl PropfindDepth {
    pub fn as_str(self) -> &'static str {
        match self {
            PropfindDepth::Zero => "0",
            PropfindDepth::One => "1",
            PropfindDepth::Infinity => "infinity",
        }
    }
}

/// One `<response>` with a successful property set
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PropfindEntry {
    /// Raw href text, either a server-absolute path or a full URL
    pub href: String,
    pub last_modified: Option<Timestamp>,
    pub size: Option<u64>,
    pub is_collection: bool,
}

impl PropfindEntry {
    /// Path component of the href, still percent-encoded
    pub fn href_path(&self) -> &str {
        let href = self.href.as_str();
        let path = match href.find("://") {
            Some(scheme_end) => {
                let after_authority = &href[scheme_end + 3..];
                match after_authority.find('/') {
                    Some(slash) => &after_authority[slash..],
                    None => "/",
                }
            }
            None => href,
        };
        path.split(['?', '#']).next().unwrap_or(path)
    }

    /// Number of non-empty path segments in the href
    pub fn depth(&self) -> usize {
        self.href_path().split('/').filter(|s| !s.is_empty()).count()
    }

    /// Resolve the href against the URL the PROPFIND was sent to
    pub fn resolve(&self, request_url: &Url) -> Option<Url> {
        request_url.join(&self.href).ok()
    }
}

/// Parsed entries ordered by ascending depth
///
/// A PROPFIND on a collection reports the collection itself as well; it is
/// always the shallowest entry and is exposed separately from its
/// descendants.
#[derive(Debug, Clone, Default)]
pub(crate) struct PropfindListing {
    entries: Vec<PropfindEntry>,
}

impl PropfindListing {
    pub fn new(mut entries: Vec<PropfindEntry>) -> Self {
        // stable, so server order is kept within one depth
        entries.sort_by_key(PropfindEntry::depth);
        Self { entries }
    }

    /// The resource the PROPFIND targeted
    pub fn node(&self) -> Option<&PropfindEntry> {
        self.entries.first()
    }

    /// Everything below the targeted resource
    pub fn children(&self) -> &[PropfindEntry] {
        self.entries.get(1..).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse a multistatus body
///
/// A blank body yields no entries. Responses without a 200 propstat or
/// without an href are skipped; malformed XML is an error.
pub(crate) fn parse_multistatus(body: &[u8]) -> Result<Vec<PropfindEntry>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut handler = MultistatusHandler::default();
    let mut buf = Vec::new();
    let mut open_elements = 0usize;
    let mut saw_root = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| malformed(reader.buffer_position(), &e.to_string()))?;

        match event {
            Event::Start(e) => {
                if open_elements == 0 && saw_root {
                    return Err(malformed(reader.buffer_position(), "more than one root element"));
                }
                open_elements += 1;
                saw_root = true;
                handler.start(&local_name(e.local_name().as_ref()));
            }
            Event::Empty(e) => {
                if open_elements == 0 && saw_root {
                    return Err(malformed(reader.buffer_position(), "more than one root element"));
                }
                saw_root = true;
                let name = local_name(e.local_name().as_ref());
                handler.start(&name);
                handler.end(&name);
            }
            Event::End(e) => {
                open_elements = open_elements.saturating_sub(1);
                handler.end(&local_name(e.local_name().as_ref()));
            }
            Event::Text(t) => {
                if open_elements == 0 {
                    return Err(malformed(reader.buffer_position(), "text outside of root element"));
                }
                let text = t
                    .unescape()
                    .map_err(|e| malformed(reader.buffer_position(), &e.to_string()))?;
                handler.text(&text);
            }
            Event::CData(c) => handler.text(&String::from_utf8_lossy(&c)),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if open_elements != 0 {
        return Err(malformed(reader.buffer_position(), "unexpected end of document"));
    }
    if !saw_root {
        return Err(malformed(reader.buffer_position(), "no root element"));
    }

    Ok(handler.entries)
}

fn malformed(position: impl std::fmt::Display, reason: &str) -> Error {
    Error::backend(format!("Malformed PROPFIND response at byte {position}: {reason}"))
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

#[derive(Debug, Default)]
struct Props {
    last_modified: Option<Timestamp>,
    size: Option<u64>,
    is_collection: bool,
}

#[derive(Debug, Default)]
struct ResponseState {
    href: Option<String>,
    props: Props,
    found: bool,
}

#[derive(Debug, Default)]
struct PropstatState {
    props: Props,
    status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Href,
    LastModified,
    ContentLength,
    Status,
}

#[derive(Debug, Default)]
struct MultistatusHandler {
    entries: Vec<PropfindEntry>,
    response: Option<ResponseState>,
    propstat: Option<PropstatState>,
    field: Option<(Field, String)>,
}

impl MultistatusHandler {
    fn start(&mut self, name: &str) {
        match name {
            "response" => {
                self.response = Some(ResponseState::default());
                self.propstat = None;
            }
            "propstat" if self.response.is_some() => {
                self.propstat = Some(PropstatState::default());
            }
            // hrefs nested in properties (e.g. principals) are not the resource href
            "href" if self.response.is_some() && self.propstat.is_none() => {
                self.field = Some((Field::Href, String::new()));
            }
            "getlastmodified" if self.propstat.is_some() => {
                self.field = Some((Field::LastModified, String::new()));
            }
            "getcontentlength" if self.propstat.is_some() => {
                self.field = Some((Field::ContentLength, String::new()));
            }
            "status" if self.propstat.is_some() => {
                self.field = Some((Field::Status, String::new()));
            }
            "collection" => {
                if let Some(propstat) = &mut self.propstat {
                    propstat.props.is_collection = true;
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if let Some((_, buffer)) = &mut self.field {
            buffer.push_str(text);
        }
    }

    fn end(&mut self, name: &str) {
        match name {
            "href" | "getlastmodified" | "getcontentlength" | "status" => self.finish_field(),
            "propstat" => self.finish_propstat(),
            "response" => self.finish_response(),
            _ => {}
        }
    }

    fn finish_field(&mut self) {
        let Some((field, text)) = self.field.take() else {
            return;
        };
        let text = text.trim();

        match field {
            Field::Href => {
                if let Some(response) = &mut self.response {
                    response.href = (!text.is_empty()).then(|| text.to_string());
                }
            }
            Field::LastModified => {
                if let Some(propstat) = &mut self.propstat {
                    propstat.props.last_modified = parse_date(text);
                }
            }
            Field::ContentLength => {
                if let Some(propstat) = &mut self.propstat {
                    propstat.props.size = text.parse().ok();
                }
            }
            Field::Status => {
                if let Some(propstat) = &mut self.propstat {
                    propstat.status = text.to_string();
                }
            }
        }
    }

    fn finish_propstat(&mut self) {
        let (Some(propstat), Some(response)) = (self.propstat.take(), self.response.as_mut()) else {
            return;
        };
        if !propstat.status.contains("200") {
            tracing::trace!(status = %propstat.status, "Ignoring propstat without 200 status");
            return;
        }

        let props = propstat.props;
        response.found = true;
        response.props.last_modified = response.props.last_modified.or(props.last_modified);
        response.props.size = response.props.size.or(props.size);
        response.props.is_collection |= props.is_collection;
    }

    fn finish_response(&mut self) {
        let Some(response) = self.response.take() else {
            return;
        };
        if !response.found {
            tracing::trace!(href = ?response.href, "No propstat element with 200 status, entry ignored");
            return;
        }
        let Some(href) = response.href else {
            tracing::trace!("Missing href in response element, entry ignored");
            return;
        };

        self.entries.push(PropfindEntry {
            href,
            last_modified: response.props.last_modified,
            size: response.props.size,
            is_collection: response.props.is_collection,
        });
    }
}

fn parse_date(text: &str) -> Option<Timestamp> {
    match DATE_PARSER.parse_timestamp(text) {
        Ok(ts) => Some(ts),
        Err(e) => {
            tracing::trace!(text, error = %e, "Unparseable getlastmodified");
            None
        }
    }
}
