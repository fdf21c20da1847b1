//! Client registry service

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::audit::{AuditEntry, AuditService};
use shared::models::{AuditAction, ClientRole, DEFAULT_COUNTRY, UNSPECIFIED_COUNTRY};
use shared::numbering::NumberPrefix;
use shared::types::{month_start, PaginatedResponse, Pagination};
use shared::validation::{validate_ice, validate_phone, validate_trade_register};

/// Client service
#[derive(Clone)]
pub struct ClientService {
    db: PgPool,
}

/// Client record
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Client {
    pub id: Uuid,
    pub code: String,
    pub company_name: String,
    pub country: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: ClientRole,
    pub trade_register_number: Option<String>,
    pub ice_number: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) const CLIENT_COLUMNS: &str = "id, code, company_name, country, email, phone, address, role, \
     trade_register_number, ice_number, is_active, created_at, updated_at";

/// Input for creating a client
#[derive(Debug, Deserialize, Validate)]
pub struct CreateClientInput {
    #[validate(length(max = 30))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Company name must be 1-100 characters"))]
    pub company_name: String,
    #[validate(length(max = 100))]
    pub country: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Option<ClientRole>,
    pub trade_register_number: Option<String>,
    pub ice_number: Option<String>,
}

/// Input for updating a client
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateClientInput {
    #[validate(length(min = 1, max = 100, message = "Company name must be 1-100 characters"))]
    pub company_name: Option<String>,
    #[validate(length(max = 100))]
    pub country: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Option<ClientRole>,
    pub trade_register_number: Option<String>,
    pub ice_number: Option<String>,
}

/// Filters for the client list
#[derive(Debug, Default, Deserialize)]
pub struct ClientFilter {
    pub search: Option<String>,
    pub role: Option<ClientRole>,
    pub country: Option<String>,
}

/// Client list with the countries available for filtering
#[derive(Debug, Serialize)]
pub struct ClientList {
    #[serde(flatten)]
    pub page: PaginatedResponse<Client>,
    pub countries: Vec<String>,
}

/// Abbreviated order shown on a client page
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ClientOrderSummary {
    pub id: Uuid,
    pub number: String,
    pub order_type: String,
    pub status: String,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Abbreviated invoice shown on a client page
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ClientInvoiceSummary {
    pub id: Uuid,
    pub number: String,
    pub status: String,
    pub amount_incl_tax: Decimal,
    pub issued_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

/// Order count for one month
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MonthlyCount {
    pub month: NaiveDate,
    pub count: i64,
}

/// Client detail page
#[derive(Debug, Serialize)]
pub struct ClientDetail {
    pub client: Client,
    pub recent_orders: Vec<ClientOrderSummary>,
    pub total_orders: i64,
    pub orders_in_progress: i64,
    pub recent_invoices: Vec<ClientInvoiceSummary>,
    pub total_invoices: i64,
    pub unpaid_invoices: i64,
    pub revenue: Decimal,
    pub monthly_orders: Vec<MonthlyCount>,
}

/// Count per country
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CountryCount {
    pub country: String,
    pub count: i64,
}

/// Client ranked by order count
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TopClient {
    pub id: Uuid,
    pub code: String,
    pub company_name: String,
    pub order_count: i64,
}

/// Client dashboard
#[derive(Debug, Serialize)]
pub struct ClientDashboard {
    pub total_clients: i64,
    pub buyers: i64,
    pub suppliers: i64,
    pub new_this_month: i64,
    pub top_clients: Vec<TopClient>,
    pub by_country: Vec<CountryCount>,
    pub recent_clients: Vec<Client>,
}

/// Chart data for the client pages
#[derive(Debug, Serialize)]
pub struct ClientStats {
    pub by_country: Vec<CountryCount>,
    pub monthly_new_clients: Vec<MonthlyCount>,
}

/// Totals printed on the client report
#[derive(Debug, Serialize)]
pub struct ClientReport {
    pub generated_at: DateTime<Utc>,
    pub total_active: i64,
    pub buyers: i64,
    pub suppliers: i64,
    pub clients: Vec<Client>,
}

fn check_identifiers(
    phone: Option<&str>,
    ice: Option<&str>,
    trade_register: Option<&str>,
) -> AppResult<()> {
    if let Some(phone) = phone.filter(|p| !p.is_empty()) {
        validate_phone(phone).map_err(AppError::invalid_field("phone"))?;
    }
    if let Some(ice) = ice.filter(|v| !v.is_empty()) {
        validate_ice(ice).map_err(AppError::invalid_field("ice_number"))?;
    }
    if let Some(rc) = trade_register.filter(|v| !v.is_empty()) {
        validate_trade_register(rc).map_err(AppError::invalid_field("trade_register_number"))?;
    }
    Ok(())
}

/// Fill a month series with zeros for months without rows
pub(crate) fn fill_months(today: NaiveDate, months: u32, rows: Vec<MonthlyCount>) -> Vec<MonthlyCount> {
    (0..months)
        .rev()
        .map(|back| {
            let month = month_start(today, back);
            let count = rows
                .iter()
                .find(|r| r.month == month)
                .map(|r| r.count)
                .unwrap_or(0);
            MonthlyCount { month, count }
        })
        .collect()
}

impl ClientService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Register a new client
    pub async fn create(&self, user_id: Uuid, input: CreateClientInput) -> AppResult<Client> {
        input.validate()?;
        check_identifiers(
            input.phone.as_deref(),
            input.ice_number.as_deref(),
            input.trade_register_number.as_deref(),
        )?;

        let code = input
            .code
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| NumberPrefix::Client.generate_now());

        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM clients WHERE code = $1)")
            .bind(&code)
            .fetch_one(&self.db)
            .await?;
        if exists {
            return Err(AppError::Conflict {
                resource: "code".to_string(),
                message: format!("Client code {} already exists", code),
                message_fr: format!("Le code client {} existe déjà", code),
            });
        }

        let mut tx = self.db.begin().await?;

        let client = sqlx::query_as::<_, Client>(&format!(
            r#"
            INSERT INTO clients (code, company_name, country, email, phone, address, role,
                                 trade_register_number, ice_number)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            CLIENT_COLUMNS
        ))
        .bind(&code)
        .bind(input.company_name.trim())
        .bind(input.country.as_deref().unwrap_or(DEFAULT_COUNTRY))
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(input.role.unwrap_or(ClientRole::Buyer).as_str())
        .bind(&input.trade_register_number)
        .bind(&input.ice_number)
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            &AuditEntry::new(user_id, AuditAction::Create, "Client", client.id, &client.company_name)
                .with_details(json!({ "code": client.code, "role": client.role.as_str() })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(code = %client.code, "Client created");
        Ok(client)
    }

    /// Get an active client
    pub async fn get(&self, client_id: Uuid) -> AppResult<Client> {
        sqlx::query_as::<_, Client>(&format!(
            "SELECT {} FROM clients WHERE id = $1 AND is_active = true",
            CLIENT_COLUMNS
        ))
        .bind(client_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Client".to_string()))
    }

    /// List active clients
    pub async fn list(&self, filter: &ClientFilter, pagination: &Pagination) -> AppResult<ClientList> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));
        let country = filter
            .country
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));
        let role = filter.role.map(|r| r.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM clients
            WHERE is_active = true
              AND ($1::text IS NULL OR company_name ILIKE $1 OR email ILIKE $1 OR code ILIKE $1)
              AND ($2::text IS NULL OR role = $2)
              AND ($3::text IS NULL OR country ILIKE $3)
            "#,
        )
        .bind(&search)
        .bind(role)
        .bind(&country)
        .fetch_one(&self.db)
        .await?;

        let clients = sqlx::query_as::<_, Client>(&format!(
            r#"
            SELECT {} FROM clients
            WHERE is_active = true
              AND ($1::text IS NULL OR company_name ILIKE $1 OR email ILIKE $1 OR code ILIKE $1)
              AND ($2::text IS NULL OR role = $2)
              AND ($3::text IS NULL OR country ILIKE $3)
            ORDER BY company_name
            LIMIT $4 OFFSET $5
            "#,
            CLIENT_COLUMNS
        ))
        .bind(&search)
        .bind(role)
        .bind(&country)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let countries = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT country FROM clients
            WHERE is_active = true AND country IS NOT NULL AND country <> ''
            ORDER BY country
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(ClientList {
            page: PaginatedResponse::new(clients, pagination, total),
            countries,
        })
    }

    /// Client page: recent activity, invoices and revenue
    pub async fn get_detail(&self, client_id: Uuid) -> AppResult<ClientDetail> {
        let client = self.get(client_id).await?;

        let recent_orders = sqlx::query_as::<_, ClientOrderSummary>(
            r#"
            SELECT o.id, o.number, o.order_type, o.status,
                   COALESCE((SELECT SUM(l.line_total) FROM order_lines l WHERE l.order_id = o.id), 0) AS total,
                   o.created_at
            FROM orders o
            WHERE o.client_id = $1
            ORDER BY o.created_at DESC
            LIMIT 10
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.db)
        .await?;

        let (total_orders, orders_in_progress) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status IN ('preparation', 'shipped'))
            FROM orders WHERE client_id = $1
            "#,
        )
        .bind(client_id)
        .fetch_one(&self.db)
        .await?;

        let recent_invoices = sqlx::query_as::<_, ClientInvoiceSummary>(
            r#"
            SELECT id, number, status, amount_incl_tax, issued_at, due_at
            FROM invoices WHERE client_id = $1
            ORDER BY issued_at DESC
            LIMIT 5
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.db)
        .await?;

        let (total_invoices, unpaid_invoices, revenue) = sqlx::query_as::<_, (i64, i64, Decimal)>(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status IN ('issued', 'sent')),
                   COALESCE(SUM(amount_incl_tax) FILTER (WHERE status = 'paid'), 0)
            FROM invoices WHERE client_id = $1
            "#,
        )
        .bind(client_id)
        .fetch_one(&self.db)
        .await?;

        let today = Utc::now().date_naive();
        let monthly = sqlx::query_as::<_, MonthlyCount>(
            r#"
            SELECT date_trunc('month', created_at)::date AS month, COUNT(*) AS count
            FROM orders
            WHERE client_id = $1 AND created_at >= $2
            GROUP BY 1
            "#,
        )
        .bind(client_id)
        .bind(month_start(today, 5))
        .fetch_all(&self.db)
        .await?;

        Ok(ClientDetail {
            client,
            recent_orders,
            total_orders,
            orders_in_progress,
            recent_invoices,
            total_invoices,
            unpaid_invoices,
            revenue,
            monthly_orders: fill_months(today, 6, monthly),
        })
    }

    /// Update a client
    pub async fn update(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        input: UpdateClientInput,
    ) -> AppResult<Client> {
        input.validate()?;
        check_identifiers(
            input.phone.as_deref(),
            input.ice_number.as_deref(),
            input.trade_register_number.as_deref(),
        )?;

        let client = sqlx::query_as::<_, Client>(&format!(
            r#"
            UPDATE clients
            SET company_name = COALESCE($2, company_name),
                country = COALESCE($3, country),
                email = COALESCE($4, email),
                phone = COALESCE($5, phone),
                address = COALESCE($6, address),
                role = COALESCE($7, role),
                trade_register_number = COALESCE($8, trade_register_number),
                ice_number = COALESCE($9, ice_number),
                updated_at = NOW()
            WHERE id = $1 AND is_active = true
            RETURNING {}
            "#,
            CLIENT_COLUMNS
        ))
        .bind(client_id)
        .bind(input.company_name.as_deref().map(str::trim))
        .bind(&input.country)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(input.role.map(|r| r.as_str()))
        .bind(&input.trade_register_number)
        .bind(&input.ice_number)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Client".to_string()))?;

        AuditService::record(
            &self.db,
            &AuditEntry::new(user_id, AuditAction::Update, "Client", client.id, &client.company_name),
        )
        .await?;

        Ok(client)
    }

    /// Soft-delete a client
    pub async fn deactivate(&self, user_id: Uuid, client_id: Uuid) -> AppResult<()> {
        let name = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE clients SET is_active = false, updated_at = NOW()
            WHERE id = $1 AND is_active = true
            RETURNING company_name
            "#,
        )
        .bind(client_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Client".to_string()))?;

        AuditService::record(
            &self.db,
            &AuditEntry::new(user_id, AuditAction::Delete, "Client", client_id, &name),
        )
        .await?;

        tracing::info!(client = %name, "Client deactivated");
        Ok(())
    }

    async fn role_counts(&self) -> AppResult<(i64, i64, i64)> {
        let counts = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE role = 'buyer'),
                   COUNT(*) FILTER (WHERE role = 'supplier')
            FROM clients WHERE is_active = true
            "#,
        )
        .fetch_one(&self.db)
        .await?;
        Ok(counts)
    }

    async fn country_counts(&self, limit: i64) -> AppResult<Vec<CountryCount>> {
        let rows = sqlx::query_as::<_, CountryCount>(
            r#"
            SELECT COALESCE(NULLIF(country, ''), $1) AS country, COUNT(*) AS count
            FROM clients
            WHERE is_active = true
            GROUP BY 1
            ORDER BY count DESC, country
            LIMIT $2
            "#,
        )
        .bind(UNSPECIFIED_COUNTRY)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    /// Client dashboard
    pub async fn dashboard(&self) -> AppResult<ClientDashboard> {
        let (total_clients, buyers, suppliers) = self.role_counts().await?;
        let today = Utc::now().date_naive();

        let new_this_month = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM clients WHERE is_active = true AND created_at >= $1",
        )
        .bind(month_start(today, 0))
        .fetch_one(&self.db)
        .await?;

        let top_clients = sqlx::query_as::<_, TopClient>(
            r#"
            SELECT c.id, c.code, c.company_name, COUNT(o.id) AS order_count
            FROM clients c
            LEFT JOIN orders o ON o.client_id = c.id
            WHERE c.is_active = true
            GROUP BY c.id, c.code, c.company_name
            ORDER BY order_count DESC, c.company_name
            LIMIT 5
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let recent_clients = sqlx::query_as::<_, Client>(&format!(
            "SELECT {} FROM clients WHERE is_active = true ORDER BY created_at DESC LIMIT 5",
            CLIENT_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(ClientDashboard {
            total_clients,
            buyers,
            suppliers,
            new_this_month,
            top_clients,
            by_country: self.country_counts(10).await?,
            recent_clients,
        })
    }

    /// Chart data: clients per country and new clients per month
    pub async fn stats(&self) -> AppResult<ClientStats> {
        let today = Utc::now().date_naive();
        let monthly = sqlx::query_as::<_, MonthlyCount>(
            r#"
            SELECT date_trunc('month', created_at)::date AS month, COUNT(*) AS count
            FROM clients
            WHERE is_active = true AND created_at >= $1
            GROUP BY 1
            "#,
        )
        .bind(month_start(today, 5))
        .fetch_all(&self.db)
        .await?;

        Ok(ClientStats {
            by_country: self.country_counts(10).await?,
            monthly_new_clients: fill_months(today, 6, monthly),
        })
    }

    /// Data for the client PDF report; records an export in the audit trail
    pub async fn report(&self, user_id: Uuid) -> AppResult<ClientReport> {
        let (total_active, buyers, suppliers) = self.role_counts().await?;
        let clients = sqlx::query_as::<_, Client>(&format!(
            "SELECT {} FROM clients WHERE is_active = true ORDER BY company_name",
            CLIENT_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        AuditService::record(
            &self.db,
            &AuditEntry::new(user_id, AuditAction::Export, "Client", "all", "Client report PDF")
                .with_details(json!({ "clients": clients.len() })),
        )
        .await?;

        Ok(ClientReport {
            generated_at: Utc::now(),
            total_active,
            buyers,
            suppliers,
            clients,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_series_is_zero_filled() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let rows = vec![MonthlyCount {
            month: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            count: 4,
        }];
        let series = fill_months(today, 6, rows);
        assert_eq!(series.len(), 6);
        assert_eq!(series[0].month, NaiveDate::from_ymd_opt(2023, 10, 1).unwrap());
        assert_eq!(series[3].count, 4);
        assert_eq!(series[5].month, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(series[5].count, 0);
    }

    #[test]
    fn identifiers_are_checked_when_present() {
        assert!(check_identifiers(None, None, None).is_ok());
        assert!(check_identifiers(Some(""), Some(""), None).is_ok());
        assert!(check_identifiers(Some("+212600000000"), Some("001525473000089"), Some("12345")).is_ok());
        assert!(check_identifiers(None, Some("123"), None).is_err());
    }
}
