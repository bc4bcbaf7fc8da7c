//! Diagonal text watermark stamped on every page of a PDF
//!
//! The stamp is an overlay only:
//! 1. One Helvetica-Bold font object and one ExtGState (opacity) object are
//!    added to the document and shared by all pages
//! 2. Each page's existing content is bracketed by a `q` stream in front and
//!    a `Q ... stamp ...` stream behind it; existing streams are untouched
//! 3. Page resources gain entries for the shared font and graphics state
//!
//! The stamp anchor is derived from each page's own MediaBox, so mixed
//! portrait/landscape documents get a correctly placed mark on every page.

use chrono::{DateTime, TimeZone};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::fmt::Display;
use tracing::{debug, warn};

use crate::date::localized_timestamp;
use crate::error::{EpaperError, Result};

/// US Letter, used when a page carries no MediaBox anywhere in its tree.
const DEFAULT_PAGE_SIZE: (f64, f64) = (612.0, 792.0);

/// Guard against cyclic `Parent` chains in broken files.
const MAX_TREE_DEPTH: usize = 32;

const FONT_BASE_NAME: &str = "WmF";
const GSTATE_BASE_NAME: &str = "WmGS";

/// Styling of the stamp. The ePaper watermark always uses
/// [`WatermarkStyle::default`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatermarkStyle {
    pub font_size: f32,
    pub opacity: f32,
    /// Counter-clockwise
    pub rotation_degrees: f32,
    pub color: (f32, f32, f32),
}

impl Default for WatermarkStyle {
    fn default() -> Self {
        Self {
            font_size: 28.0,
            opacity: 0.25,
            rotation_degrees: 45.0,
            color: (0.8, 0.1, 0.1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
}

impl PageGeometry {
    /// Where the stamp's baseline starts: a quarter across, half way up.
    pub fn anchor(&self) -> (f64, f64) {
        (self.width / 4.0, self.height / 2.0)
    }
}

/// Everything needed to stamp one document.
#[derive(Debug, Clone)]
pub struct WatermarkRequest<'a> {
    pub source: &'a [u8],
    pub text: String,
    pub style: WatermarkStyle,
}

#[derive(Debug, Clone)]
pub struct WatermarkedDocument {
    pub bytes: Vec<u8>,
    /// Geometry of every stamped page, in document order
    pub pages: Vec<PageGeometry>,
}

impl WatermarkedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// `"<username> - <localized timestamp>"`
pub fn watermark_text<Tz>(username: &str, timestamp: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("{} - {}", username, localized_timestamp(timestamp))
}

/// Stamp `username` and `timestamp` on every page of `source`.
///
/// The text is composed once, so every page carries the same timestamp.
pub fn apply_watermark<Tz>(
    source: &[u8],
    username: &str,
    timestamp: &DateTime<Tz>,
) -> Result<WatermarkedDocument>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    stamp_document(&WatermarkRequest {
        source,
        text: watermark_text(username, timestamp),
        style: WatermarkStyle::default(),
    })
}

pub fn stamp_document(request: &WatermarkRequest<'_>) -> Result<WatermarkedDocument> {
    let mut doc = Document::load_mem(request.source).map_err(|e| {
        warn!("Source is not a parseable PDF: {}", e);
        EpaperError::MalformedDocument(e.to_string())
    })?;

    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    if page_ids.is_empty() {
        return Err(EpaperError::MalformedDocument(
            "document has no pages".into(),
        ));
    }

    let font_id = doc.add_object(Object::Dictionary(watermark_font()));
    let gstate_id = doc.add_object(Object::Dictionary(opacity_state(request.style.opacity)));
    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let text = encode_win_ansi(&request.text);

    let mut pages = Vec::with_capacity(page_ids.len());
    for page_id in page_ids {
        let geometry = page_geometry(&doc, page_id);
        let (font_name, gstate_name) = attach_resources(&mut doc, page_id, font_id, gstate_id)?;

        let stamp = stamp_content(&request.style, geometry, &font_name, &gstate_name, &text)?;
        let stamp_id = doc.add_object(Stream::new(Dictionary::new(), stamp));
        wrap_contents(&mut doc, page_id, open_id, stamp_id)?;

        pages.push(geometry);
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| EpaperError::Serialization(e.to_string()))?;

    debug!(
        "Stamped {} pages ({} -> {} bytes)",
        pages.len(),
        request.source.len(),
        bytes.len()
    );

    Ok(WatermarkedDocument { bytes, pages })
}

fn watermark_font() -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    }
}

fn opacity_state(opacity: f32) -> Dictionary {
    dictionary! {
        "Type" => "ExtGState",
        "ca" => Object::Real(opacity),
        "CA" => Object::Real(opacity),
    }
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn number(doc: &Document, object: &Object) -> Option<f64> {
    match resolve(doc, object)? {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Look up a page attribute, following `Parent` links for inheritable keys.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return resolve(doc, value);
        }
        current = dict.get(b"Parent").ok()?.as_reference().ok()?;
    }
    None
}

pub(crate) fn page_geometry(doc: &Document, page_id: ObjectId) -> PageGeometry {
    let corners = inherited(doc, page_id, b"MediaBox")
        .and_then(|obj| obj.as_array().ok())
        .filter(|arr| arr.len() == 4)
        .and_then(|arr| {
            arr.iter()
                .map(|v| number(doc, v))
                .collect::<Option<Vec<f64>>>()
        });

    match corners {
        Some(c) => PageGeometry {
            width: (c[2] - c[0]).abs(),
            height: (c[3] - c[1]).abs(),
        },
        None => {
            debug!("Page {:?} has no usable MediaBox, assuming Letter", page_id);
            PageGeometry {
                width: DEFAULT_PAGE_SIZE.0,
                height: DEFAULT_PAGE_SIZE.1,
            }
        }
    }
}

/// Owned copy of a dictionary-valued entry, dereferencing if needed.
fn owned_dict(doc: &Document, object: Option<&Object>) -> Dictionary {
    object
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
        .cloned()
        .unwrap_or_else(Dictionary::new)
}

fn free_name(dict: &Dictionary, base: &str) -> String {
    (1..)
        .map(|n| format!("{}{}", base, n))
        .find(|name| !dict.has(name.as_bytes()))
        .unwrap_or_else(|| base.to_string())
}

/// Give the page its own resource dictionary that also names the shared
/// font and graphics state. Shared or inherited resource objects are copied,
/// not edited.
fn attach_resources(
    doc: &mut Document,
    page_id: ObjectId,
    font_id: ObjectId,
    gstate_id: ObjectId,
) -> Result<(String, String)> {
    let mut resources = owned_dict(doc, inherited(doc, page_id, b"Resources"));
    let mut fonts = owned_dict(doc, resources.get(b"Font").ok());
    let mut gstates = owned_dict(doc, resources.get(b"ExtGState").ok());

    let font_name = free_name(&fonts, FONT_BASE_NAME);
    let gstate_name = free_name(&gstates, GSTATE_BASE_NAME);
    fonts.set(font_name.as_bytes().to_vec(), Object::Reference(font_id));
    gstates.set(gstate_name.as_bytes().to_vec(), Object::Reference(gstate_id));
    resources.set("Font", Object::Dictionary(fonts));
    resources.set("ExtGState", Object::Dictionary(gstates));

    let page = doc
        .get_dictionary_mut(page_id)
        .map_err(|e| EpaperError::MalformedDocument(format!("page {:?}: {}", page_id, e)))?;
    page.set("Resources", Object::Dictionary(resources));

    Ok((font_name, gstate_name))
}

/// Replace `Contents` with `[open, ...existing, stamp]`.
fn wrap_contents(
    doc: &mut Document,
    page_id: ObjectId,
    open_id: ObjectId,
    stamp_id: ObjectId,
) -> Result<()> {
    let existing: Vec<Object> = {
        let page = doc
            .get_dictionary(page_id)
            .map_err(|e| EpaperError::MalformedDocument(e.to_string()))?;
        match page.get(b"Contents") {
            Ok(Object::Array(items)) => items.clone(),
            Ok(Object::Reference(id)) => match doc.get_object(*id) {
                Ok(Object::Array(items)) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(other) => vec![other.clone()],
            Err(_) => Vec::new(),
        }
    };

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing);
    contents.push(Object::Reference(stamp_id));

    let page = doc
        .get_dictionary_mut(page_id)
        .map_err(|e| EpaperError::MalformedDocument(e.to_string()))?;
    page.set("Contents", Object::Array(contents));
    Ok(())
}

fn stamp_content(
    style: &WatermarkStyle,
    geometry: PageGeometry,
    font_name: &str,
    gstate_name: &str,
    text: &[u8],
) -> Result<Vec<u8>> {
    let (x, y) = geometry.anchor();
    let radians = style.rotation_degrees.to_radians();
    let (sin, cos) = radians.sin_cos();
    let (r, g, b) = style.color;

    let content = Content {
        operations: vec![
            // closes the `q` opened in front of the original content
            Operation::new("Q", vec![]),
            Operation::new("q", vec![]),
            Operation::new("gs", vec![Object::Name(gstate_name.as_bytes().to_vec())]),
            Operation::new(
                "rg",
                vec![Object::Real(r), Object::Real(g), Object::Real(b)],
            ),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    Object::Name(font_name.as_bytes().to_vec()),
                    Object::Real(style.font_size),
                ],
            ),
            Operation::new(
                "Tm",
                vec![
                    Object::Real(cos),
                    Object::Real(sin),
                    Object::Real(-sin),
                    Object::Real(cos),
                    Object::Real(x as f32),
                    Object::Real(y as f32),
                ],
            ),
            Operation::new(
                "Tj",
                vec![Object::String(text.to_vec(), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ],
    };

    // Leading newline keeps the first operator separate from whatever the
    // previous stream ends with when viewers concatenate streams.
    let mut bytes = vec![b'\n'];
    bytes.extend(
        content
            .encode()
            .map_err(|e| EpaperError::Serialization(e.to_string()))?,
    );
    Ok(bytes)
}

/// Encode for a WinAnsiEncoding font. Characters the encoding lacks become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            _ => b'?',
        })
        .collect()
}
