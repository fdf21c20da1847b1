//! Authentication and authorization tests
//!
//! Property-based and unit tests for:
//! - Role permission enforcement
//! - Account field validation
//! - Morocco company identifier validation

use proptest::prelude::*;
use shared::{
    permission_key, validate_email, validate_ice, validate_password_pair, validate_phone,
    validate_trade_register, validate_username, Action, Resource, UserRole,
};

// ============================================================================
// Property Test Strategies
// ============================================================================

fn role_strategy() -> impl Strategy<Value = UserRole> {
    prop::sample::select(UserRole::ALL.to_vec())
}

fn resource_strategy() -> impl Strategy<Value = Resource> {
    prop::sample::select(Resource::ALL.to_vec())
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop::sample::select(Action::ALL.to_vec())
}

/// Generate valid usernames
fn username_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9@.+_-]{1,150}"
}

/// Generate valid passwords (8+ chars)
fn password_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9!@#$%]{8,40}"
}

/// Generate Moroccan phone numbers with and without country code
fn phone_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "0[5-7][0-9]{8}",
        "\\+212 [5-7][0-9]{2}-[0-9]{2}-[0-9]{2}-[0-9]{2}",
    ]
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn only_admin_sees_audit_and_users() {
        for role in [UserRole::Manager, UserRole::Accountant] {
            let keys = role.permission_keys();
            assert!(!keys.contains(&permission_key(Resource::Audit, Action::View)));
            assert!(!keys.contains(&permission_key(Resource::User, Action::View)));
        }
        let keys = UserRole::Admin.permission_keys();
        assert!(keys.contains(&permission_key(Resource::Audit, Action::View)));
    }

    #[test]
    fn accountant_invoices_but_does_not_move_stock() {
        let keys = UserRole::Accountant.permission_keys();
        assert!(keys.contains(&permission_key(Resource::Invoice, Action::Create)));
        assert!(keys.contains(&permission_key(Resource::Invoice, Action::Export)));
        assert!(!keys.contains(&permission_key(Resource::Stock, Action::Create)));
        assert!(!keys.contains(&permission_key(Resource::Order, Action::Edit)));
    }

    #[test]
    fn manager_runs_orders_and_logistics() {
        let keys = UserRole::Manager.permission_keys();
        assert!(keys.contains(&permission_key(Resource::Order, Action::Edit)));
        assert!(keys.contains(&permission_key(Resource::Delivery, Action::Create)));
        assert!(keys.contains(&permission_key(Resource::Stock, Action::Create)));
        assert!(!keys.contains(&permission_key(Resource::Invoice, Action::Edit)));
    }

    #[test]
    fn new_accounts_default_to_manager() {
        assert_eq!(UserRole::default(), UserRole::Manager);
    }

    #[test]
    fn permission_keys_are_resource_colon_action() {
        assert_eq!(permission_key(Resource::Stock, Action::Export), "stock:export");
        assert_eq!(permission_key(Resource::Order, Action::Delete), "orders:delete");
    }

    #[test]
    fn password_confirmation_must_match() {
        assert!(validate_password_pair("sardines1", "sardines1").is_ok());
        assert_eq!(
            validate_password_pair("sardines1", "sardines2"),
            Err("Passwords do not match")
        );
        assert!(validate_password_pair("short", "short").is_err());
    }

    #[test]
    fn usernames_reject_spaces() {
        assert!(validate_username("ahmed.b").is_ok());
        assert!(validate_username("ahmed b").is_err());
        assert!(validate_username("").is_err());
    }

    #[test]
    fn email_addresses() {
        assert!(validate_email("export@fishflow.ma").is_ok());
        assert!(validate_email("not-an-email").is_err());
    }

    #[test]
    fn ice_is_fifteen_digits() {
        assert!(validate_ice("001525874000089").is_ok());
        assert!(validate_ice("00152587400008").is_err());
        assert!(validate_ice("00152587400008A").is_err());
    }

    #[test]
    fn trade_register_accepts_city_suffix() {
        assert!(validate_trade_register("123456").is_ok());
        assert!(validate_trade_register("123456/AGADIR").is_ok());
        assert!(validate_trade_register("/AGADIR").is_err());
        assert!(validate_trade_register("RC123").is_err());
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #[test]
        fn admin_holds_every_permission(resource in resource_strategy(), action in action_strategy()) {
            let keys = UserRole::Admin.permission_keys();
            prop_assert!(keys.contains(&permission_key(resource, action)));
        }

        #[test]
        fn export_implies_view(role in role_strategy(), resource in resource_strategy()) {
            let keys = role.permission_keys();
            if keys.contains(&permission_key(resource, Action::Export)) {
                prop_assert!(keys.contains(&permission_key(resource, Action::View)));
            }
        }

        #[test]
        fn role_names_round_trip(role in role_strategy()) {
            prop_assert_eq!(role.as_str().parse::<UserRole>().unwrap(), role);
        }

        #[test]
        fn generated_usernames_are_valid(username in username_strategy()) {
            prop_assert!(validate_username(&username).is_ok());
        }

        #[test]
        fn matching_passwords_are_accepted(password in password_strategy()) {
            prop_assert!(validate_password_pair(&password, &password).is_ok());
        }

        #[test]
        fn moroccan_phones_are_valid(phone in phone_strategy()) {
            prop_assert!(validate_phone(&phone).is_ok());
        }

        #[test]
        fn ice_rejects_wrong_lengths(digits in "[0-9]{1,30}") {
            prop_assume!(digits.len() != 15);
            prop_assert!(validate_ice(&digits).is_err());
        }
    }
}
