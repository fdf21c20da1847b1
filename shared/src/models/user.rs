//! User roles and permissions

use serde::{Deserialize, Serialize};

text_enum! {
    /// Role of a staff account
    pub enum UserRole {
        Admin => "admin",
        Accountant => "accountant",
        Manager => "manager",
    }
}

impl Default for UserRole {
    fn default() -> Self {
        UserRole::Manager
    }
}

text_enum! {
    /// Resources that can be accessed
    pub enum Resource {
        User => "users",
        Client => "clients",
        Product => "products",
        Stock => "stock",
        Order => "orders",
        Invoice => "invoices",
        Document => "documents",
        Delivery => "deliveries",
        Report => "reports",
        Audit => "audit",
    }
}

text_enum! {
    /// Actions that can be performed on resources
    pub enum Action {
        View => "view",
        Create => "create",
        Edit => "edit",
        Delete => "delete",
        Export => "export",
    }
}

/// A permission granting access to a resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permission {
    pub resource: Resource,
    pub actions: Vec<Action>,
}

impl Permission {
    fn new(resource: Resource, actions: &[Action]) -> Self {
        Self {
            resource,
            actions: actions.to_vec(),
        }
    }

    /// `resource:action` keys carried in access tokens
    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        self.actions
            .iter()
            .map(move |a| permission_key(self.resource, *a))
    }
}

pub fn permission_key(resource: Resource, action: Action) -> String {
    format!("{}:{}", resource.as_str(), action.as_str())
}

impl UserRole {
    /// Permissions granted to the role
    pub fn permissions(&self) -> Vec<Permission> {
        use Action::*;

        const ALL_ACTIONS: &[Action] = &[View, Create, Edit, Delete, Export];
        const MANAGE: &[Action] = &[View, Create, Edit, Delete];

        match self {
            UserRole::Admin => Resource::ALL
                .iter()
                .map(|r| Permission::new(*r, ALL_ACTIONS))
                .collect(),
            UserRole::Accountant => vec![
                Permission::new(Resource::Client, &[View, Export]),
                Permission::new(Resource::Product, &[View]),
                Permission::new(Resource::Stock, &[View, Export]),
                Permission::new(Resource::Order, &[View]),
                Permission::new(Resource::Invoice, &[View, Create, Edit, Export]),
                Permission::new(Resource::Document, &[View, Create]),
                Permission::new(Resource::Delivery, &[View]),
                Permission::new(Resource::Report, &[View, Export]),
            ],
            UserRole::Manager => vec![
                Permission::new(Resource::Client, &[View, Create, Edit, Delete, Export]),
                Permission::new(Resource::Product, MANAGE),
                Permission::new(Resource::Stock, &[View, Create, Export]),
                Permission::new(Resource::Order, MANAGE),
                Permission::new(Resource::Invoice, &[View, Create]),
                Permission::new(Resource::Document, MANAGE),
                Permission::new(Resource::Delivery, MANAGE),
                Permission::new(Resource::Report, &[View, Export]),
            ],
        }
    }

    /// Flattened `resource:action` keys
    pub fn permission_keys(&self) -> Vec<String> {
        self.permissions()
            .iter()
            .flat_map(|p| p.keys().collect::<Vec<_>>())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_has_every_permission() {
        let keys = UserRole::Admin.permission_keys();
        assert_eq!(keys.len(), Resource::ALL.len() * Action::ALL.len());
        assert!(keys.contains(&"audit:view".to_string()));
    }

    #[test]
    fn accountant_cannot_touch_stock_or_users() {
        let keys = UserRole::Accountant.permission_keys();
        assert!(keys.contains(&"invoices:edit".to_string()));
        assert!(!keys.contains(&"stock:create".to_string()));
        assert!(!keys.iter().any(|k| k.starts_with("users:")));
    }

    #[test]
    fn manager_runs_orders_but_not_audit() {
        let keys = UserRole::Manager.permission_keys();
        assert!(keys.contains(&"orders:edit".to_string()));
        assert!(keys.contains(&"stock:create".to_string()));
        assert!(!keys.contains(&"audit:view".to_string()));
    }
}
