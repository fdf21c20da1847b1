//! PDF rendering for invoices, purchase orders and reports
//!
//! Pages are A4 and use the standard Helvetica fonts with WinAnsi encoding,
//! so no font files are embedded. Text outside Latin-1 is replaced.

use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use rust_decimal::Decimal;

use crate::config::CompanyConfig;
use crate::error::{AppError, AppResult};
use crate::services::client::{Client, ClientReport};
use crate::services::invoice::InvoiceDetail;
use crate::services::order::{Order, OrderLine};
use crate::services::stock::StockReport;
use shared::models::{order_total, OrderType};

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const LINE_GAP: f32 = 4.0;

/// Encode text for a WinAnsi Type1 font
pub fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '€' => 0x80,
            '’' | '‘' => b'\'',
            '“' | '”' => b'"',
            '–' | '—' => b'-',
            c if (c as u32) < 0x20 => b' ',
            c if (c as u32) <= 0xFF => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

/// Approximate Helvetica advance width
fn text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5
}

/// Cut text so it fits in `width` points
fn fit(text: &str, width: f32, size: f32) -> String {
    let max_chars = ((width - 4.0) / (size * 0.5)).floor().max(1.0) as usize;
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('.');
    cut
}

fn money(amount: Decimal, currency: &str) -> String {
    format!("{:.2} {}", amount, currency)
}

fn date(at: &DateTime<Utc>) -> String {
    at.format("%d/%m/%Y").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub header: &'static str,
    pub width: f32,
    pub align: Align,
}

impl Column {
    pub const fn left(header: &'static str, width: f32) -> Self {
        Self {
            header,
            width,
            align: Align::Left,
        }
    }

    pub const fn right(header: &'static str, width: f32) -> Self {
        Self {
            header,
            width,
            align: Align::Right,
        }
    }
}

/// Page-flowing PDF writer
pub struct PdfBuilder {
    pages: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    y: f32,
    footer: String,
}

impl PdfBuilder {
    pub fn new(footer: impl Into<String>) -> Self {
        Self {
            pages: Vec::new(),
            current: Vec::new(),
            y: PAGE_HEIGHT - MARGIN,
            footer: footer.into(),
        }
    }

    fn new_page(&mut self) {
        let done = std::mem::take(&mut self.current);
        self.pages.push(done);
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn ensure_space(&mut self, height: f32) -> bool {
        if self.y - height < MARGIN + 20.0 {
            self.new_page();
            true
        } else {
            false
        }
    }

    fn text_at(&mut self, x: f32, y: f32, size: f32, bold: bool, text: &str) {
        let font = if bold { "F2" } else { "F1" };
        self.current.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.into(), size.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::string_literal(encode_text(text))]),
            Operation::new("ET", vec![]),
        ]);
    }

    /// Write a line of text at the left margin
    pub fn line(&mut self, text: &str, size: f32, bold: bool) -> &mut Self {
        self.ensure_space(size + LINE_GAP);
        self.y -= size + LINE_GAP;
        let y = self.y;
        self.text_at(MARGIN, y, size, bold, text);
        self
    }

    /// Centered title
    pub fn title(&mut self, text: &str, size: f32) -> &mut Self {
        self.ensure_space(size + LINE_GAP * 3.0);
        self.y -= size + LINE_GAP * 2.0;
        let x = ((PAGE_WIDTH - text_width(text, size)) / 2.0).max(MARGIN);
        let y = self.y;
        self.text_at(x, y, size, true, text);
        self.y -= LINE_GAP;
        self
    }

    /// Label and value pairs, one per line
    pub fn fields(&mut self, pairs: &[(&str, String)]) -> &mut Self {
        for (label, value) in pairs {
            self.ensure_space(14.0);
            self.y -= 14.0;
            let y = self.y;
            self.text_at(MARGIN, y, 10.0, true, label);
            self.text_at(MARGIN + 130.0, y, 10.0, false, value);
        }
        self
    }

    pub fn gap(&mut self, height: f32) -> &mut Self {
        if !self.ensure_space(height) {
            self.y -= height;
        }
        self
    }

    pub fn rule(&mut self) -> &mut Self {
        self.ensure_space(8.0);
        self.y -= 6.0;
        let y = self.y;
        self.current.extend([
            Operation::new("w", vec![0.5f32.into()]),
            Operation::new("m", vec![MARGIN.into(), y.into()]),
            Operation::new("l", vec![(PAGE_WIDTH - MARGIN).into(), y.into()]),
            Operation::new("S", vec![]),
        ]);
        self
    }

    fn row(&mut self, columns: &[Column], cells: &[String], bold: bool) {
        let size = 9.0;
        self.y -= size + LINE_GAP + 2.0;
        let y = self.y;
        let mut x = MARGIN;
        for (column, cell) in columns.iter().zip(cells) {
            let text = fit(cell, column.width, size);
            let tx = match column.align {
                Align::Left => x + 2.0,
                Align::Right => x + column.width - 2.0 - text_width(&text, size),
            };
            self.text_at(tx, y, size, bold, &text);
            x += column.width;
        }
    }

    /// Table with the header repeated on every page it spans
    pub fn table(&mut self, columns: &[Column], rows: &[Vec<String>]) -> &mut Self {
        let headers: Vec<String> = columns.iter().map(|c| c.header.to_string()).collect();
        self.ensure_space(40.0);
        self.row(columns, &headers, true);
        self.rule();
        for cells in rows {
            if self.ensure_space(16.0) {
                self.row(columns, &headers, true);
                self.rule();
            }
            self.row(columns, cells, false);
        }
        self
    }

    /// Lay out the pages and serialize the document
    pub fn finish(mut self) -> AppResult<Vec<u8>> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.new_page();
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let regular = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let bold = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => regular,
                "F2" => bold,
            },
        });

        let total = self.pages.len();
        let mut kids: Vec<Object> = Vec::with_capacity(total);
        for (index, mut operations) in std::mem::take(&mut self.pages).into_iter().enumerate() {
            let footer = format!("{}    Page {} / {}", self.footer, index + 1, total);
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 8f32.into()]),
                Operation::new("Td", vec![MARGIN.into(), (MARGIN - 20.0).into()]),
                Operation::new("Tj", vec![Object::string_literal(encode_text(&footer))]),
                Operation::new("ET", vec![]),
            ]);

            let content = Content { operations }
                .encode()
                .map_err(|e| AppError::PdfError(e.to_string()))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => total as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| AppError::PdfError(e.to_string()))?;
        Ok(bytes)
    }
}

fn letterhead(pdf: &mut PdfBuilder, company: &CompanyConfig) {
    pdf.line(&company.name, 16.0, true)
        .line(&company.address, 9.0, false)
        .line(&company.city, 9.0, false)
        .line(&format!("Tel: {}  Email: {}", company.phone, company.email), 9.0, false)
        .rule();
}

fn client_block(pdf: &mut PdfBuilder, heading: &str, client: &Client) {
    pdf.gap(6.0).line(heading, 11.0, true).line(&client.company_name, 10.0, false);
    if let Some(address) = client.address.as_deref().filter(|a| !a.is_empty()) {
        pdf.line(address, 9.0, false);
    }
    if let Some(country) = client.country.as_deref().filter(|c| !c.is_empty()) {
        pdf.line(country, 9.0, false);
    }
    pdf.line(&format!("Email: {}", client.email), 9.0, false);
    if let Some(ice) = client.ice_number.as_deref().filter(|v| !v.is_empty()) {
        pdf.line(&format!("ICE: {}", ice), 9.0, false);
    }
    if let Some(rc) = client.trade_register_number.as_deref().filter(|v| !v.is_empty()) {
        pdf.line(&format!("RC: {}", rc), 9.0, false);
    }
}

const LINE_COLUMNS: [Column; 5] = [
    Column::left("Product", 165.0),
    Column::left("Code", 80.0),
    Column::right("Quantity", 80.0),
    Column::right("Unit price", 85.0),
    Column::right("Total", 85.0),
];

fn line_rows(lines: &[OrderLine], currency: &str) -> Vec<Vec<String>> {
    lines
        .iter()
        .map(|l| {
            vec![
                l.product_name.clone(),
                l.product_code.clone(),
                format!("{} {}", l.quantity, l.unit),
                money(l.unit_price, currency),
                money(l.line_total, currency),
            ]
        })
        .collect()
}

/// Invoice PDF
pub fn render_invoice(company: &CompanyConfig, detail: &InvoiceDetail) -> AppResult<Vec<u8>> {
    let invoice = &detail.invoice;
    let currency = company.currency.as_str();
    let mut pdf = PdfBuilder::new(format!("{} - Invoice {}", company.name, invoice.number));

    letterhead(&mut pdf, company);
    pdf.title(&format!("INVOICE No {}", invoice.number), 16.0);
    client_block(&mut pdf, "Billed to", &detail.client);

    pdf.gap(8.0).fields(&[
        ("Issue date:", date(&invoice.issued_at)),
        ("Due date:", date(&invoice.due_at)),
        ("Order:", invoice.order_number.clone()),
        ("Payment method:", invoice.payment_method.label().to_string()),
        ("Status:", invoice.status.as_str().to_uppercase()),
    ]);

    pdf.gap(10.0).table(&LINE_COLUMNS, &line_rows(&detail.lines, currency));

    pdf.rule().fields(&[
        ("Total excl. tax:", money(invoice.amount_excl_tax, currency)),
        (
            "VAT:",
            format!("{} ({}%)", money(invoice.tax_amount, currency), invoice.tax_rate.normalize()),
        ),
        ("Total incl. tax:", money(invoice.amount_incl_tax, currency)),
    ]);

    pdf.gap(16.0)
        .line("Payment conditions", 10.0, true)
        .line(
            &format!("Payment due by {} by {}.", date(&invoice.due_at), invoice.payment_method.label().to_lowercase()),
            9.0,
            false,
        )
        .line("Late payments incur penalties as provided by law.", 9.0, false);

    pdf.finish()
}

/// Purchase order PDF
pub fn render_purchase_order(
    company: &CompanyConfig,
    order: &Order,
    client: &Client,
    lines: &[OrderLine],
) -> AppResult<Vec<u8>> {
    let currency = company.currency.as_str();
    let mut pdf = PdfBuilder::new(format!("{} - Purchase order {}", company.name, order.number));

    letterhead(&mut pdf, company);
    pdf.title(&format!("PURCHASE ORDER No {}", order.number), 16.0);
    client_block(&mut pdf, "Client", client);

    let mut fields = vec![
        ("Order date:", date(&order.created_at)),
        ("Type:", order.order_type.label().to_string()),
        ("Status:", order.status.as_str().to_uppercase()),
    ];
    if order.order_type != OrderType::Local {
        fields.push((
            "Incoterm:",
            order.incoterm.clone().unwrap_or_else(|| "-".to_string()),
        ));
    }
    if let Some(shipping) = order.shipping_date {
        fields.push(("Shipping date:", shipping.format("%d/%m/%Y").to_string()));
    }
    pdf.gap(8.0).fields(&fields);

    let mut rows = line_rows(lines, currency);
    rows.push(vec![
        "GRAND TOTAL".to_string(),
        String::new(),
        String::new(),
        String::new(),
        money(order_total(lines.iter().map(|l| &l.line_total)), currency),
    ]);
    pdf.gap(10.0).table(&LINE_COLUMNS, &rows);

    if let Some(comment) = order.comment.as_deref().filter(|c| !c.trim().is_empty()) {
        pdf.gap(10.0).line("Comment", 10.0, true);
        for text in comment.lines() {
            pdf.line(text, 9.0, false);
        }
    }

    pdf.gap(16.0)
        .line("General conditions", 10.0, true)
        .line("Goods remain our property until paid in full.", 9.0, false)
        .line("Fresh products must be inspected on receipt; claims within 24 hours.", 9.0, false)
        .line("Prices are exclusive of tax unless stated otherwise.", 9.0, false);

    pdf.finish()
}

/// Stock report PDF
pub fn render_stock_report(
    company: &CompanyConfig,
    report: &StockReport,
    username: &str,
) -> AppResult<Vec<u8>> {
    let currency = company.currency.as_str();
    let mut pdf = PdfBuilder::new(format!("Generated by {}", username));

    letterhead(&mut pdf, company);
    pdf.title("STOCK REPORT", 16.0)
        .line(&format!("Generated on {}", report.generated_at.format("%d/%m/%Y %H:%M")), 9.0, false)
        .gap(6.0)
        .fields(&[
            ("Products:", report.lines.len().to_string()),
            ("Stock value:", money(report.total_value, currency)),
            ("In alert:", report.alert_count.to_string()),
            ("Out of stock:", report.zero_stock_count.to_string()),
        ]);

    let rows: Vec<Vec<String>> = report
        .lines
        .iter()
        .map(|l| {
            vec![
                l.code.clone(),
                l.name.clone(),
                format!("{} {}", l.stock_quantity, l.unit),
                money(l.unit_price, currency),
                money(l.value, currency),
                l.stock_level.label().to_string(),
            ]
        })
        .collect();

    pdf.gap(10.0).table(
        &[
            Column::left("Code", 80.0),
            Column::left("Product", 125.0),
            Column::right("Quantity", 75.0),
            Column::right("Unit price", 75.0),
            Column::right("Value", 80.0),
            Column::left("Status", 60.0),
        ],
        &rows,
    );

    if !report.month_to_date.is_empty() {
        pdf.gap(12.0).line("Movements this month", 10.0, true);
        let totals: Vec<(&str, String)> = report
            .month_to_date
            .iter()
            .map(|t| (t.movement_type.as_str(), format!("{} movements, {} units", t.count, t.quantity)))
            .collect();
        pdf.fields(&totals);
    }

    pdf.finish()
}

/// Client report PDF
pub fn render_client_report(
    company: &CompanyConfig,
    report: &ClientReport,
    username: &str,
) -> AppResult<Vec<u8>> {
    let mut pdf = PdfBuilder::new(format!("Generated by {}", username));

    letterhead(&mut pdf, company);
    pdf.title("CLIENT REPORT", 16.0)
        .line(&format!("Generated on {}", report.generated_at.format("%d/%m/%Y %H:%M")), 9.0, false)
        .gap(6.0)
        .fields(&[
            ("Active clients:", report.total_active.to_string()),
            ("Buyers:", report.buyers.to_string()),
            ("Suppliers:", report.suppliers.to_string()),
        ]);

    let rows: Vec<Vec<String>> = report
        .clients
        .iter()
        .map(|c| {
            vec![
                c.code.clone(),
                c.company_name.clone(),
                c.email.clone(),
                c.country.clone().unwrap_or_default(),
                c.role.as_str().to_uppercase(),
                date(&c.created_at),
            ]
        })
        .collect();

    pdf.gap(10.0).table(
        &[
            Column::left("Code", 95.0),
            Column::left("Company", 110.0),
            Column::left("Email", 110.0),
            Column::left("Country", 65.0),
            Column::left("Role", 55.0),
            Column::left("Created", 60.0),
        ],
        &rows,
    );

    pdf.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_encoded_as_win_ansi() {
        assert_eq!(encode_text("Thon"), b"Thon".to_vec());
        assert_eq!(encode_text("Crevette é"), b"Crevette \xe9".to_vec());
        assert_eq!(encode_text("10 €"), b"10 \x80".to_vec());
        assert_eq!(encode_text("鱼"), b"?".to_vec());
        assert_eq!(encode_text("a\nb"), b"a b".to_vec());
    }

    #[test]
    fn long_cells_are_cut_to_the_column() {
        assert_eq!(fit("Sardine", 100.0, 9.0), "Sardine");
        let cut = fit("Anchois de Méditerranée extra frais", 40.0, 9.0);
        assert!(cut.chars().count() < 10);
        assert!(cut.ends_with('.'));
    }

    #[test]
    fn builder_produces_a_pdf() {
        let mut pdf = PdfBuilder::new("test");
        pdf.title("STOCK REPORT", 16.0).line("hello", 10.0, false);
        let bytes = pdf.finish().unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn long_tables_flow_onto_new_pages() {
        let rows: Vec<Vec<String>> = (0..120)
            .map(|i| vec![format!("PROD{}", i), "Sole".to_string()])
            .collect();
        let mut pdf = PdfBuilder::new("test");
        pdf.table(&[Column::left("Code", 100.0), Column::left("Name", 100.0)], &rows);
        let bytes = pdf.finish().unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() >= 3);
    }
}
