//! Settlement report parsing: header detection, column mapping, Chilean
//! amounts and dates, and reconciliation against order totals.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::middleware::error_handling::{AppError, Result};
use crate::models::liquidation::{LineMatchStatus, NewLiquidationLine, ParsedLiquidationRow};
use crate::models::marketplace::Marketplace;
use crate::services::file_parser_service::SheetRows;
use crate::services::scan_service::suborder_variants;

/// Rows searched for the header line.
pub const HEADER_SCAN_ROWS: usize = 15;
/// Gross amounts may differ from the order total by rounding only.
pub const AMOUNT_TOLERANCE: Decimal = Decimal::ONE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Suborder,
    Gross,
    Commission,
    Shipping,
    Net,
    SettlementDate,
    Document,
}

const COMMON_ALIASES: &[(Field, &[&str])] = &[
    (
        Field::Suborder,
        &[
            "suborden", "suborder", "nsuborden", "nosuborden", "nrosuborden", "numerosuborden",
            "orden", "noorden", "nodeorden", "order", "orderid", "ordernumber", "nroorden", "numeroorden", "numerodeorden",
            "idorden", "pedido", "nropedido", "numeropedido", "numerodepedido",
        ],
    ),
    (
        Field::Gross,
        &[
            "montobruto", "bruto", "ventabruta", "totalventa", "montoventa", "valorventa",
            "precioventa", "monto", "total", "importe", "grossamount", "gross",
        ],
    ),
    (
        Field::Commission,
        &[
            "comision", "comisiones", "comisionmarketplace", "cargoporventa", "cargosporventa",
            "commission", "fee",
        ],
    ),
    (
        Field::Shipping,
        &[
            "envio", "costoenvio", "costodeenvio", "cargoenvio", "despacho", "costodespacho",
            "flete", "shipping",
        ],
    ),
    (
        Field::Net,
        &[
            "neto", "montoneto", "totalneto", "montoaliquidar", "montoapagar", "totalapagar",
            "apagar", "liquidado", "netamount", "net",
        ],
    ),
    (
        Field::SettlementDate,
        &[
            "fecha", "fechaliquidacion", "fechadeliquidacion", "fechapago", "fechadepago",
            "fechadeposito", "settlementdate",
        ],
    ),
    (
        Field::Document,
        &[
            "documento", "nrodocumento", "numerodocumento", "folio", "factura", "nrofactura",
            "boleta", "documentnumber",
        ],
    ),
];

/// Channel-specific column names on top of the common ones.
fn marketplace_aliases(marketplace: Marketplace) -> &'static [(Field, &'static [&'static str])] {
    match marketplace {
        Marketplace::MercadoLibre => &[
            (Field::Suborder, &["nodeventa", "deventa", "nventa", "idventa", "venta", "packid"]),
            (Field::Gross, &["ingresosporproductos", "preciounitariodeventadelapublicacion"]),
            (Field::Commission, &["cargoporventaeimpuestos"]),
            (Field::Shipping, &["costosdeenvio", "ingresosporenvio"]),
        ],
        Marketplace::Falabella => &[
            (Field::Suborder, &["nroordencompra", "ordencompra", "ordernr"]),
            (Field::Gross, &["preciopagado", "itemprice"]),
        ],
        Marketplace::Walmart => &[
            (Field::Suborder, &["purchaseorder", "purchaseordernumber", "po", "ponumber"]),
            (Field::Gross, &["productamount", "itemtotal"]),
        ],
        Marketplace::Ripley => &[(Field::Suborder, &["nroot", "ot", "numeroot"])],
        Marketplace::Paris => &[(Field::Suborder, &["subordernumber", "ordencompracliente"])],
        Marketplace::WooCommerce => &[(Field::Suborder, &["orderno", "idpedido"])],
    }
}

/// Lower-case, accents folded, only ASCII letters and digits.
pub fn header_key(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| {
            let c = match c {
                'á' | 'Á' | 'à' | 'ä' => 'a',
                'é' | 'É' | 'è' | 'ë' => 'e',
                'í' | 'Í' | 'ì' | 'ï' => 'i',
                'ó' | 'Ó' | 'ò' | 'ö' => 'o',
                'ú' | 'Ú' | 'ù' | 'ü' | 'Ü' => 'u',
                'ñ' | 'Ñ' => 'n',
                '°' | 'º' => 'o',
                c => c,
            };
            c.is_ascii_alphanumeric().then(|| c.to_ascii_lowercase())
        })
        .collect()
}

fn field_for(marketplace: Marketplace, key: &str) -> Option<Field> {
    marketplace_aliases(marketplace)
        .iter()
        .chain(COMMON_ALIASES.iter())
        .find(|(_, aliases)| aliases.contains(&key))
        .map(|(field, _)| *field)
}

/// Column index per field for one header row; first column wins on duplicates.
fn map_header(marketplace: Marketplace, row: &[String]) -> HashMap<Field, usize> {
    let mut columns = HashMap::new();
    for (index, cell) in row.iter().enumerate() {
        if let Some(field) = field_for(marketplace, &header_key(cell)) {
            columns.entry(field).or_insert(index);
        }
    }
    columns
}

#[derive(Debug, Clone)]
pub struct ColumnMap {
    /// Index into `SheetRows::rows` of the header.
    pub header_index: usize,
    pub columns: HashMap<Field, usize>,
}

/// Header row within the first `HEADER_SCAN_ROWS` rows: must name the suborder
/// column; the row naming most known columns wins.
pub fn detect_header(sheet: &SheetRows, marketplace: Marketplace) -> Result<ColumnMap> {
    sheet
        .rows
        .iter()
        .take(HEADER_SCAN_ROWS)
        .enumerate()
        .map(|(index, (_, row))| (index, map_header(marketplace, row)))
        .filter(|(_, columns)| columns.contains_key(&Field::Suborder))
        .max_by(|(ia, a), (ib, b)| a.len().cmp(&b.len()).then(ib.cmp(ia)))
        .map(|(header_index, columns)| ColumnMap {
            header_index,
            columns,
        })
        .ok_or_else(|| {
            AppError::InvalidInput(format!(
                "No header row with an order/suborder column found in the first {} rows for {}",
                HEADER_SCAN_ROWS,
                marketplace.display_name()
            ))
        })
}

/// Parses `$ 12.990`, `1.234,56`, `-1.000`, `(1.500)` and plain numbers.
/// Empty cells are `None`.
pub fn parse_amount(raw: &str) -> std::result::Result<Option<Decimal>, String> {
    let mut text: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '$')
        .collect();
    text = text.trim_start_matches("CLP").trim_end_matches("CLP").to_string();
    if text.is_empty() || text == "-" {
        return Ok(None);
    }

    let mut negative = false;
    if text.starts_with('(') && text.ends_with(')') {
        negative = true;
        text = text[1..text.len() - 1].to_string();
    }
    if let Some(rest) = text.strip_prefix('-') {
        negative = !negative;
        text = rest.to_string();
    } else if let Some(rest) = text.strip_suffix('-') {
        negative = !negative;
        text = rest.to_string();
    }

    let dots = text.matches('.').count();
    let commas = text.matches(',').count();
    let canonical = match (dots, commas) {
        (0, 0) => text.clone(),
        (_, 0) => thousands_or_decimal(&text, '.'),
        (0, _) => thousands_or_decimal(&text, ','),
        _ => {
            // Both present: the right-most one is the decimal separator.
            let last_dot = text.rfind('.').unwrap_or(0);
            let last_comma = text.rfind(',').unwrap_or(0);
            if last_comma > last_dot {
                text.replace('.', "").replace(',', ".")
            } else {
                text.replace(',', "")
            }
        }
    };

    if canonical.is_empty() || !canonical.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(format!("'{}' is not an amount", raw.trim()));
    }
    let value = Decimal::from_str(&canonical).map_err(|_| format!("'{}' is not an amount", raw.trim()))?;
    Ok(Some(if negative { -value } else { value }))
}

/// A single separator followed by exactly three digits groups thousands (pesos
/// carry no decimals); repeated separators always do.
fn thousands_or_decimal(text: &str, separator: char) -> String {
    let parts: Vec<&str> = text.split(separator).collect();
    let grouped = parts.len() > 2
        || parts
            .last()
            .is_some_and(|last| last.len() == 3 && !parts[0].is_empty());
    if grouped {
        parts.concat()
    } else {
        text.replace(separator, ".")
    }
}

/// Chilean day-first dates, ISO dates, optional time part, or Excel serial numbers.
pub fn parse_date(raw: &str) -> std::result::Result<Option<NaiveDate>, String> {
    let text = raw.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let date_part = text
        .split(|c: char| c.is_whitespace() || c == 'T')
        .next()
        .unwrap_or(text);

    // two-digit years first: %Y would read "24" as year 24
    for format in ["%d-%m-%y", "%d/%m/%y", "%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y", "%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
            return Ok(Some(date));
        }
    }

    if let Ok(serial) = text.parse::<f64>() {
        if (20_000.0..80_000.0).contains(&serial) {
            let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)
                .ok_or_else(|| "invalid epoch".to_string())?;
            return Ok(Some(epoch + Duration::days(serial.floor() as i64)));
        }
    }

    Err(format!("'{}' is not a date", text))
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowFailure {
    pub row_number: i32,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedSettlement {
    pub rows: Vec<ParsedLiquidationRow>,
    pub failures: Vec<RowFailure>,
}

impl ParsedSettlement {
    pub fn row_count(&self) -> usize {
        self.rows.len() + self.failures.len()
    }
}

pub fn parse_settlement(sheet: &SheetRows, marketplace: Marketplace) -> Result<ParsedSettlement> {
    let map = detect_header(sheet, marketplace)?;
    let mut parsed = ParsedSettlement::default();

    for (line, row) in sheet.rows.iter().skip(map.header_index + 1) {
        let row_number = i32::try_from(*line).unwrap_or(i32::MAX);
        match parse_row(row_number, row, &map.columns) {
            Ok(Some(row)) => parsed.rows.push(row),
            // totals/footer lines without an order number
            Ok(None) => {}
            Err(reason) => parsed.failures.push(RowFailure { row_number, reason }),
        }
    }

    Ok(parsed)
}

fn parse_row(
    row_number: i32,
    row: &[String],
    columns: &HashMap<Field, usize>,
) -> std::result::Result<Option<ParsedLiquidationRow>, String> {
    let cell = |field: Field| cell_text(row, columns, field);

    let suborder = cell(Field::Suborder);
    if suborder.is_empty() {
        // notes and blank lines are skipped; an amount without an order is an error
        let has_amount = !cell(Field::Gross).is_empty() || !cell(Field::Net).is_empty();
        return if has_amount {
            Err("missing suborder number".to_string())
        } else {
            Ok(None)
        };
    }
    if header_key(suborder).starts_with("total") {
        return Ok(None);
    }

    let text = |field: Field| {
        let value = cell(field);
        (!value.is_empty()).then(|| value.to_string())
    };

    Ok(Some(ParsedLiquidationRow {
        row_number,
        suborder_number: suborder.to_string(),
        gross_amount: parse_amount(cell(Field::Gross))?,
        commission_amount: parse_amount(cell(Field::Commission))?,
        shipping_amount: parse_amount(cell(Field::Shipping))?,
        net_amount: parse_amount(cell(Field::Net))?,
        settlement_date: parse_date(cell(Field::SettlementDate))?,
        document_number: text(Field::Document),
    }))
}

fn cell_text<'a>(row: &'a [String], columns: &HashMap<Field, usize>, field: Field) -> &'a str {
    columns
        .get(&field)
        .and_then(|index| row.get(*index))
        .map(|s| s.trim())
        .unwrap_or("")
}

/// Forms under which a settlement row's suborder is looked up.
pub fn lookup_keys(rows: &[ParsedLiquidationRow]) -> Vec<String> {
    let mut keys: Vec<String> = rows
        .iter()
        .flat_map(|r| suborder_variants(&r.suborder_number))
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

/// Matches a row against `{UPPER(suborder) -> (order id, total)}`.
pub fn reconcile(
    row: ParsedLiquidationRow,
    orders: &HashMap<String, (Uuid, Decimal)>,
) -> NewLiquidationLine {
    let found = suborder_variants(&row.suborder_number)
        .iter()
        .find_map(|key| orders.get(key).copied());

    let Some((order_id, total)) = found else {
        return NewLiquidationLine {
            row,
            order_id: None,
            match_status: LineMatchStatus::Unmatched,
            amount_difference: None,
        };
    };

    let difference = row.gross_amount.map(|gross| gross - total);
    let match_status = match difference {
        Some(diff) if diff.abs() > AMOUNT_TOLERANCE => LineMatchStatus::AmountMismatch,
        _ => LineMatchStatus::Matched,
    };

    NewLiquidationLine {
        row,
        order_id: Some(order_id),
        match_status,
        amount_difference: difference,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::file_parser_service::FileType;
    use rust_decimal_macros::dec;

    fn sheet(rows: &[&[&str]]) -> SheetRows {
        SheetRows {
            file_type: FileType::Csv,
            rows: rows
                .iter()
                .enumerate()
                .map(|(i, r)| (i + 1, r.iter().map(|c| c.to_string()).collect()))
                .collect(),
            empty_rows_skipped: 0,
        }
    }

    #[test]
    fn test_parse_chilean_amounts() {
        assert_eq!(parse_amount("$ 12.990").unwrap(), Some(dec!(12990)));
        assert_eq!(parse_amount("1.234,56").unwrap(), Some(dec!(1234.56)));
        assert_eq!(parse_amount("-1.000").unwrap(), Some(dec!(-1000)));
        assert_eq!(parse_amount("(1.500)").unwrap(), Some(dec!(-1500)));
        assert_eq!(parse_amount("1.234.567").unwrap(), Some(dec!(1234567)));
        assert_eq!(parse_amount("1,234.50").unwrap(), Some(dec!(1234.50)));
        assert_eq!(parse_amount("12990.5").unwrap(), Some(dec!(12990.5)));
        assert_eq!(parse_amount("15,5").unwrap(), Some(dec!(15.5)));
        assert_eq!(parse_amount("CLP 5.000").unwrap(), Some(dec!(5000)));
        assert_eq!(parse_amount("  ").unwrap(), None);
        assert!(parse_amount("doce mil").is_err());
    }

    #[test]
    fn test_parse_dates() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15);
        assert_eq!(parse_date("15-03-2024").unwrap(), expected);
        assert_eq!(parse_date("15/03/2024 10:22").unwrap(), expected);
        assert_eq!(parse_date("2024-03-15T08:00:00").unwrap(), expected);
        assert_eq!(parse_date("45366").unwrap(), expected);
        assert_eq!(parse_date("").unwrap(), None);
        assert!(parse_date("marzo").is_err());
    }

    #[test]
    fn test_header_key_folds_accents() {
        assert_eq!(header_key("N° Suborden"), "nosuborden");
        assert_eq!(header_key("Comisión"), "comision");
        assert_eq!(header_key("# de venta"), "deventa");
    }

    #[test]
    fn test_detects_header_below_title_block() {
        let sheet = sheet(&[
            &["Liquidación Ripley", "", ""],
            &["Periodo: marzo 2024", "", ""],
            &["Suborden", "Monto Bruto", "Comisión", "Fecha Pago"],
            &["RP-1001", "$ 12.990", "1.299", "15-03-2024"],
        ]);
        let map = detect_header(&sheet, Marketplace::Ripley).unwrap();
        assert_eq!(map.header_index, 2);
        assert_eq!(map.columns[&Field::Suborder], 0);
        assert_eq!(map.columns[&Field::Gross], 1);
        assert_eq!(map.columns[&Field::SettlementDate], 3);
    }

    #[test]
    fn test_header_must_appear_early() {
        let title: &[&str] = &["titulo"];
        let mut rows = vec![title; HEADER_SCAN_ROWS];
        rows.push(&["Suborden", "Monto"]);
        assert!(detect_header(&sheet(&rows), Marketplace::Paris).is_err());
    }

    #[test]
    fn test_marketplace_specific_aliases() {
        let sheet = sheet(&[&["# de venta", "Ingresos por productos", "Cargo por venta e impuestos"]]);
        let map = detect_header(&sheet, Marketplace::MercadoLibre).unwrap();
        assert_eq!(map.columns.len(), 3);
        assert!(detect_header(&sheet, Marketplace::Walmart).is_err());
    }

    #[test]
    fn test_parse_settlement_rows_and_failures() {
        let sheet = sheet(&[
            &["Suborden", "Monto", "Neto"],
            &["RP-1001", "$ 12.990", "11.000"],
            &["RP-1002", "doce", ""],
            &["", "", ""],
            &["Total", "$ 25.980", "22.000"],
        ]);
        let parsed = parse_settlement(&sheet, Marketplace::Ripley).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].row_number, 2);
        assert_eq!(parsed.rows[0].gross_amount, Some(dec!(12990)));
        assert_eq!(parsed.rows[0].net_amount, Some(dec!(11000)));
        assert_eq!(parsed.failures.len(), 1);
        assert_eq!(parsed.failures[0].row_number, 3);
        assert_eq!(parsed.row_count(), 2);
    }

    fn row(suborder: &str, gross: Option<Decimal>) -> ParsedLiquidationRow {
        ParsedLiquidationRow {
            row_number: 2,
            suborder_number: suborder.to_string(),
            gross_amount: gross,
            commission_amount: None,
            shipping_amount: None,
            net_amount: None,
            settlement_date: None,
            document_number: None,
        }
    }

    #[test]
    fn test_reconcile() {
        let id = Uuid::new_v4();
        let orders = HashMap::from([("1001".to_string(), (id, dec!(12990)))]);

        let line = reconcile(row("RP-1001", Some(dec!(12990.4))), &orders);
        assert_eq!(line.match_status, LineMatchStatus::Matched);
        assert_eq!(line.order_id, Some(id));

        let line = reconcile(row("1001", Some(dec!(12000))), &orders);
        assert_eq!(line.match_status, LineMatchStatus::AmountMismatch);
        assert_eq!(line.amount_difference, Some(dec!(-990)));

        let line = reconcile(row("1001", None), &orders);
        assert_eq!(line.match_status, LineMatchStatus::Matched);
        assert_eq!(line.amount_difference, None);

        let line = reconcile(row("9999", Some(dec!(1))), &orders);
        assert_eq!(line.match_status, LineMatchStatus::Unmatched);
        assert_eq!(line.order_id, None);
    }

    #[test]
    fn test_lookup_keys_are_unique() {
        let keys = lookup_keys(&[row("RP-1001", None), row("rp-1001", None)]);
        assert_eq!(keys, vec!["1001".to_string(), "RP-1001".to_string()]);
    }
}
