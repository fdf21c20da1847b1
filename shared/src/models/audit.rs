//! Audit trail models

text_enum! {
    /// What a user did to a record
    pub enum AuditAction {
        Create => "create",
        Update => "update",
        Delete => "delete",
        View => "view",
        Export => "export",
        Import => "import",
    }
}
