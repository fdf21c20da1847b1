//! Order document models

text_enum! {
    /// Kind of file attached to an order
    pub enum DocumentType {
        Invoice => "invoice",
        DeliveryNote => "delivery_note",
        PurchaseOrder => "purchase_order",
        CertificateOfOrigin => "certificate_of_origin",
        ExportLicence => "export_licence",
        BillOfLading => "bill_of_lading",
        Other => "other",
    }
}

impl DocumentType {
    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "Invoice",
            DocumentType::DeliveryNote => "Delivery note",
            DocumentType::PurchaseOrder => "Purchase order",
            DocumentType::CertificateOfOrigin => "Certificate of origin",
            DocumentType::ExportLicence => "Export licence",
            DocumentType::BillOfLading => "Bill of lading",
            DocumentType::Other => "Other",
        }
    }
}

/// Reduce an uploaded file name to something safe to join onto a directory.
///
/// Keeps ASCII letters, digits, `.`, `-` and `_`; everything else becomes
/// `_`. Leading dots are dropped so the result can never be `..` or hidden.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "document".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\docs\\bl 2024.pdf"), "bl_2024.pdf");
        assert_eq!(sanitize_file_name(".."), "document");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
    }

    #[test]
    fn document_type_round_trips_through_text() {
        for t in DocumentType::ALL {
            assert_eq!(t.as_str().parse::<DocumentType>().unwrap(), *t);
        }
        assert!("contract".parse::<DocumentType>().is_err());
    }
}
