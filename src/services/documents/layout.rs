//! Thin drawing layer over printpdf.
//!
//! Coordinates are millimetres measured from the top-left corner of the page;
//! the conversion to PDF's bottom-left origin happens here only.

use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Rect, Rgb,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use super::barcode::{code128_modules, qr_modules};
use crate::middleware::error_handling::{AppError, Result};

pub const A4: PageSize = PageSize { width: 210.0, height: 297.0 };
pub const LABEL_100X150: PageSize = PageSize { width: 100.0, height: 150.0 };

pub const MARGIN: f32 = 12.0;

#[derive(Debug, Clone, Copy)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

pub struct PdfCanvas {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    size: PageSize,
    pages: usize,
    /// Next free line, from the top.
    pub cursor: f32,
}

impl PdfCanvas {
    pub fn new(title: &str, size: PageSize) -> Result<Self> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(size.width), Mm(size.height), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| AppError::Document(format!("font: {}", e)))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| AppError::Document(format!("font: {}", e)))?;
        let layer = doc.get_page(page).get_layer(layer);

        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            size,
            pages: 1,
            cursor: MARGIN,
        })
    }

    pub fn size(&self) -> PageSize {
        self.size
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn new_page(&mut self) {
        let (page, layer) =
            self.doc
                .add_page(Mm(self.size.width), Mm(self.size.height), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.pages += 1;
        self.cursor = MARGIN;
    }

    /// Starts a new page when `height` mm do not fit above the bottom margin.
    /// Returns whether a page break happened.
    pub fn ensure_space(&mut self, height: f32) -> bool {
        if self.cursor + height > self.size.height - MARGIN {
            self.new_page();
            true
        } else {
            false
        }
    }

    pub fn text(&self, x: f32, y: f32, size: f32, value: &str) {
        self.layer
            .use_text(pdf_text(value), size, Mm(x), Mm(self.size.height - y), &self.regular);
    }

    pub fn bold(&self, x: f32, y: f32, size: f32, value: &str) {
        self.layer
            .use_text(pdf_text(value), size, Mm(x), Mm(self.size.height - y), &self.bold);
    }

    /// Right-aligned against `right_x`, using an average Helvetica glyph width.
    pub fn text_right(&self, right_x: f32, y: f32, size: f32, value: &str) {
        let width = estimate_width(value, size);
        self.text(right_x - width, y, size, value);
    }

    pub fn hline(&self, x1: f32, x2: f32, y: f32, thickness: f32) {
        self.layer.set_outline_color(black());
        self.layer.set_outline_thickness(thickness);
        let y = self.size.height - y;
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(x1), Mm(y)), false),
                (Point::new(Mm(x2), Mm(y)), false),
            ],
            is_closed: false,
        });
    }

    pub fn frame(&self, x: f32, y: f32, width: f32, height: f32) {
        self.hline(x, x + width, y, 0.4);
        self.hline(x, x + width, y + height, 0.4);
        let top = self.size.height - y;
        let bottom = self.size.height - y - height;
        for vx in [x, x + width] {
            self.layer.add_line(Line {
                points: vec![
                    (Point::new(Mm(vx), Mm(top)), false),
                    (Point::new(Mm(vx), Mm(bottom)), false),
                ],
                is_closed: false,
            });
        }
    }

    pub fn fill_rect(&self, x: f32, y: f32, width: f32, height: f32, shade: f32) {
        self.layer
            .set_fill_color(Color::Rgb(Rgb::new(shade, shade, shade, None)));
        let bottom = self.size.height - y - height;
        let rect = Rect::new(Mm(x), Mm(bottom), Mm(x + width), Mm(bottom + height))
            .with_mode(PaintMode::Fill);
        self.layer.add_rect(rect);
        self.layer.set_fill_color(black());
    }

    /// Code128 bars stretched to `width` mm.
    pub fn code128(&self, x: f32, y: f32, width: f32, height: f32, value: &str) -> Result<()> {
        let modules = code128_modules(value)?;
        let module_width = width / modules.len() as f32;
        let mut index = 0;
        while index < modules.len() {
            if modules[index] == 1 {
                let start = index;
                while index < modules.len() && modules[index] == 1 {
                    index += 1;
                }
                let run = (index - start) as f32;
                self.fill_rect(x + start as f32 * module_width, y, run * module_width, height, 0.0);
            } else {
                index += 1;
            }
        }
        Ok(())
    }

    pub fn qr(&self, x: f32, y: f32, side: f32, value: &str) -> Result<()> {
        let (width, modules) = qr_modules(value)?;
        let module = side / width as f32;
        for (i, dark) in modules.iter().enumerate() {
            if *dark {
                let col = (i % width) as f32;
                let row = (i / width) as f32;
                self.fill_rect(x + col * module, y + row * module, module, module, 0.0);
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Result<(Vec<u8>, usize)> {
        let pages = self.pages;
        let bytes = self
            .doc
            .save_to_bytes()
            .map_err(|e| AppError::Document(format!("save: {}", e)))?;
        Ok((bytes, pages))
    }
}

fn black() -> Color {
    Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None))
}

fn estimate_width(value: &str, size: f32) -> f32 {
    // ~0.5 em per glyph, 1 pt = 0.3528 mm
    value.chars().count() as f32 * size * 0.5 * 0.3528
}

/// Builtin PDF fonts only cover Latin-1 reliably; fold Spanish accents to ASCII.
pub fn pdf_text(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'Á' | 'À' | 'Ä' | 'Â' => 'A',
            'É' | 'È' | 'Ë' | 'Ê' => 'E',
            'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
            'Ó' | 'Ò' | 'Ö' | 'Ô' => 'O',
            'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
            'ñ' => 'n',
            'Ñ' => 'N',
            'ç' => 'c',
            'Ç' => 'C',
            '°' | 'º' => 'o',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            c if c.is_whitespace() => ' ',
            _ => '?',
        })
        .collect()
}

/// Cuts to `max` characters, marking the cut with `...`.
pub fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let kept: String = value.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Chilean peso format: `$ 1.234.567`, no decimals.
pub fn format_clp(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let digits = rounded.abs().to_i128().unwrap_or(0).to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    if negative {
        format!("-$ {}", grouped)
    } else {
        format!("$ {}", grouped)
    }
}
