use std::fmt::Write as _;

use tracing::debug;

use super::photo::{self, EmbeddedImage};
use super::{FormContent, FormRenderer, RenderError};
use crate::workflows::applications::domain::{
    AddressBlock, Country, Gender, KindDetails, Relation,
};

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const LABEL_COLUMN: f32 = 170.0;
const PHOTO_BOX: (f32, f32) = (85.0, 100.0);

const DECLARATION: &str = "I hereby declare that the information provided in this application is true and correct to the best of my knowledge.";

/// Type sizes tried in order until the form fits on the page.
#[derive(Debug, Clone, Copy)]
struct Style {
    body: f32,
    line: f32,
    /// Lines kept per field value; the rest is elided.
    max_lines: Option<usize>,
}

/// The last style bounds every row, so any validated form fits with it.
const STYLES: [Style; 3] = [
    Style {
        body: 10.0,
        line: 13.0,
        max_lines: None,
    },
    Style {
        body: 8.5,
        line: 11.0,
        max_lines: None,
    },
    Style {
        body: 7.0,
        line: 9.0,
        max_lines: Some(3),
    },
];

/// Single-page A4 form written directly in PDF syntax with the standard Helvetica faces.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfFormRenderer;

impl FormRenderer for PdfFormRenderer {
    fn render(&self, content: &FormContent<'_>) -> Result<Vec<u8>, RenderError> {
        let embedded = content.photo.and_then(photo::decode);
        for style in STYLES {
            match layout(content, embedded.as_ref(), style) {
                Ok(stream) => return Ok(assemble(&stream, embedded.as_ref())),
                Err(RenderError::Overflow) => {
                    debug!(number = %content.number, body = style.body, "form overflowed, tightening layout");
                }
                Err(err) => return Err(err),
            }
        }
        Err(RenderError::Overflow)
    }
}

#[derive(Debug, Clone, Copy)]
enum Face {
    Regular,
    Bold,
}

impl Face {
    fn resource(self) -> &'static str {
        match self {
            Face::Regular => "/F1",
            Face::Bold => "/F2",
        }
    }
}

/// Content stream builder tracking the cursor from the top of the page.
struct Page {
    ops: String,
    cursor: f32,
}

impl Page {
    fn new() -> Self {
        Self {
            ops: String::new(),
            cursor: PAGE_HEIGHT - MARGIN,
        }
    }

    fn text(&mut self, face: Face, size: f32, x: f32, y: f32, value: &str) {
        let _ = writeln!(
            self.ops,
            "BT {} {size:.1} Tf {x:.2} {y:.2} Td ({}) Tj ET",
            face.resource(),
            escape(value)
        );
    }

    fn centered(&mut self, face: Face, size: f32, value: &str) {
        let width = text_width(value, size);
        let x = ((PAGE_WIDTH - width) / 2.0).max(MARGIN);
        self.text(face, size, x, self.cursor, value);
    }

    fn rule(&mut self, x1: f32, x2: f32, y: f32) {
        let _ = writeln!(
            self.ops,
            "0.75 G 0.5 w {x1:.2} {y:.2} m {x2:.2} {y:.2} l S 0 G"
        );
    }

    fn advance(&mut self, amount: f32) -> Result<(), RenderError> {
        self.cursor -= amount;
        if self.cursor < MARGIN {
            return Err(RenderError::Overflow);
        }
        Ok(())
    }
}

fn layout(
    content: &FormContent<'_>,
    photo: Option<&EmbeddedImage>,
    style: Style,
) -> Result<String, RenderError> {
    let mut page = Page::new();
    let Style { body, line, .. } = style;

    page.advance(10.0)?;
    page.centered(Face::Bold, 16.0, content.kind.form_title());
    page.advance(24.0)?;

    match photo {
        Some(photo) => {
            let scale = (PHOTO_BOX.0 / photo.width as f32).min(PHOTO_BOX.1 / photo.height as f32);
            let (width, height) = (photo.width as f32 * scale, photo.height as f32 * scale);
            page.advance(height)?;
            let x = (PAGE_WIDTH - width) / 2.0;
            let _ = writeln!(
                page.ops,
                "q {width:.2} 0 0 {height:.2} {x:.2} {:.2} cm /Im1 Do Q",
                page.cursor
            );
            page.advance(line)?;
            page.centered(Face::Regular, 9.0, "Applicant Photo");
        }
        None => page.centered(Face::Regular, body, "Photo supplied separately"),
    }
    page.advance(line * 2.0)?;

    let value_x = MARGIN + LABEL_COLUMN;
    let value_width = PAGE_WIDTH - MARGIN - value_x;
    for (label, value) in field_rows(content) {
        let mut lines = wrap(&value, body, value_width);
        if let Some(max_lines) = style.max_lines {
            elide(&mut lines, max_lines, body, value_width);
        }
        page.text(Face::Bold, body, MARGIN, page.cursor, label);
        for (index, text) in lines.iter().enumerate() {
            if index > 0 {
                page.advance(line)?;
            }
            page.text(Face::Regular, body, value_x, page.cursor, text);
        }
        page.rule(MARGIN, PAGE_WIDTH - MARGIN, page.cursor - 4.0);
        page.advance(line + 4.0)?;
    }

    page.advance(line)?;
    let date = format!(
        "Application Date: {}",
        content.application_date.format("%d-%m-%Y")
    );
    page.text(Face::Regular, body, MARGIN, page.cursor, &date);
    page.advance(line * 2.0)?;

    for text in wrap(DECLARATION, body, PAGE_WIDTH - 2.0 * MARGIN) {
        page.text(Face::Regular, body, MARGIN, page.cursor, &text);
        page.advance(line)?;
    }

    page.advance(line * 2.0)?;
    let signature_start = PAGE_WIDTH - MARGIN - 180.0;
    page.rule(signature_start, PAGE_WIDTH - MARGIN, page.cursor);
    page.advance(line)?;
    page.text(
        Face::Regular,
        body,
        signature_start,
        page.cursor,
        "Applicant's Signature",
    );

    Ok(page.ops)
}

fn field_rows(content: &FormContent<'_>) -> Vec<(&'static str, String)> {
    let applicant = content.applicant;
    let mut rows = vec![
        ("Application Number", content.number.to_string()),
        ("Full Name", applicant.full_name.clone()),
        (
            "Date of Birth",
            applicant.date_of_birth.format("%d-%m-%Y").to_string(),
        ),
        ("Gender", gender_label(applicant.gender).to_string()),
        ("Permanent Address", address_line(&applicant.permanent_address)),
        ("Current Address", address_line(&applicant.current_address)),
        ("Phone", applicant.phone.clone()),
        ("Email", applicant.email.clone()),
    ];

    match &applicant.details {
        KindDetails::Passport(details) => {
            rows.push(("Next of Kin", details.next_of_kin.clone()));
            rows.push((
                "Relation",
                relation_label(details.next_of_kin_relation).to_string(),
            ));
            rows.push(("Next of Kin Phone", details.next_of_kin_phone.clone()));
        }
        KindDetails::PanCard(details) => {
            rows.push(("Father's Name", details.father_name.clone()));
            rows.push(("Aadhaar Number", details.aadhaar_number.clone()));
        }
    }
    rows
}

fn address_line(address: &AddressBlock) -> String {
    format!(
        "{}, {} - {}, {}",
        address.address,
        address.state,
        address.pincode,
        country_label(address.country)
    )
}

fn gender_label(gender: Gender) -> &'static str {
    match gender {
        Gender::Male => "Male",
        Gender::Female => "Female",
        Gender::Other => "Other",
    }
}

fn relation_label(relation: Relation) -> &'static str {
    match relation {
        Relation::Parent => "Parent",
        Relation::Spouse => "Spouse",
        Relation::Sibling => "Sibling",
        Relation::Child => "Child",
        Relation::Friend => "Friend",
        Relation::Relative => "Relative",
    }
}

fn country_label(country: Country) -> &'static str {
    match country {
        Country::India => "India",
        Country::Usa => "USA",
        Country::Uk => "UK",
        Country::Canada => "Canada",
        Country::Australia => "Australia",
        Country::Other => "Other",
    }
}

/// Average Helvetica advance is a little over half the font size.
fn text_width(value: &str, size: f32) -> f32 {
    value.chars().count() as f32 * size * 0.52
}

fn chars_per_line(size: f32, width: f32) -> usize {
    ((width / (size * 0.52)) as usize).max(1)
}

fn wrap(value: &str, size: f32, width: f32) -> Vec<String> {
    let max_chars = chars_per_line(size, width);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in value.split_whitespace() {
        let mut word = word.to_string();
        while word.chars().count() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let split = word
                .char_indices()
                .nth(max_chars)
                .map(|(index, _)| index)
                .unwrap_or(word.len());
            let rest = word.split_off(split);
            lines.push(word);
            word = rest;
        }

        let needed = current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Keeps the first `max_lines` lines, marking the cut with an ellipsis.
fn elide(lines: &mut Vec<String>, max_lines: usize, size: f32, width: f32) {
    if lines.len() <= max_lines {
        return;
    }
    lines.truncate(max_lines);
    let keep = chars_per_line(size, width).saturating_sub(3);
    if let Some(last) = lines.last_mut() {
        *last = last.chars().take(keep).collect::<String>() + "...";
    }
}

/// PDF string literal body in WinAnsi; characters outside Latin-1 become '?'.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            '\u{a0}'..='\u{ff}' => {
                let _ = write!(out, "\\{:03o}", c as u32);
            }
            _ => out.push('?'),
        }
    }
    out
}

struct PdfWriter {
    buffer: Vec<u8>,
    offsets: Vec<usize>,
}

impl PdfWriter {
    fn new() -> Self {
        let mut buffer = b"%PDF-1.4\n".to_vec();
        buffer.extend_from_slice(&[b'%', 0xE2, 0xE3, 0xCF, 0xD3, b'\n']);
        Self {
            buffer,
            offsets: Vec::new(),
        }
    }

    fn object(&mut self, body: &str) {
        self.begin();
        self.buffer.extend_from_slice(body.as_bytes());
        self.buffer.extend_from_slice(b"\nendobj\n");
    }

    fn stream(&mut self, dictionary: &str, data: &[u8]) {
        self.begin();
        let header = format!("<< {dictionary} /Length {} >>\nstream\n", data.len());
        self.buffer.extend_from_slice(header.as_bytes());
        self.buffer.extend_from_slice(data);
        self.buffer.extend_from_slice(b"\nendstream\nendobj\n");
    }

    fn begin(&mut self) {
        self.offsets.push(self.buffer.len());
        let header = format!("{} 0 obj\n", self.offsets.len());
        self.buffer.extend_from_slice(header.as_bytes());
    }

    fn finish(mut self) -> Vec<u8> {
        let xref_at = self.buffer.len();
        let mut table = format!("xref\n0 {}\n0000000000 65535 f \n", self.offsets.len() + 1);
        for offset in &self.offsets {
            let _ = writeln!(table, "{offset:010} 00000 n ");
        }
        let _ = write!(
            table,
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            self.offsets.len() + 1
        );
        self.buffer.extend_from_slice(table.as_bytes());
        self.buffer
    }
}

fn assemble(stream: &str, photo: Option<&EmbeddedImage>) -> Vec<u8> {
    let mut writer = PdfWriter::new();
    let xobjects = if photo.is_some() {
        " /XObject << /Im1 7 0 R >>"
    } else {
        ""
    };

    writer.object("<< /Type /Catalog /Pages 2 0 R >>");
    writer.object("<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    writer.object(&format!(
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH:.0} {PAGE_HEIGHT:.0}] \
         /Resources << /Font << /F1 4 0 R /F2 5 0 R >>{xobjects} >> /Contents 6 0 R >>"
    ));
    writer.object(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
    );
    writer.object(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>",
    );
    writer.stream("", stream.as_bytes());

    if let Some(photo) = photo {
        writer.stream(
            &format!(
                "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceRGB \
                 /BitsPerComponent 8 /Filter /DCTDecode",
                photo.width, photo.height
            ),
            &photo.data,
        );
    }

    writer.finish()
}
