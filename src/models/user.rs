use serde::{Deserialize, Serialize};
use std::fmt;

/// Непрозрачный идентификатор пользователя, выданный сервисом авторизации.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "customer" | "user" => Some(Role::Customer),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Кто выполняет операцию: пользователь и его роль.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn customer(user_id: impl Into<String>) -> Self {
        Self { user_id: UserId::new(user_id), role: Role::Customer }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self { user_id: UserId::new(user_id), role: Role::Admin }
    }

    pub fn is_privileged(&self) -> bool {
        self.role == Role::Admin
    }

    /// Владелец брони или администратор.
    pub fn may_act_for(&self, owner: Option<&UserId>) -> bool {
        self.is_privileged() || owner == Some(&self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_bookings_are_admin_only() {
        let customer = Actor::customer("u-1");
        assert!(customer.may_act_for(Some(&UserId::new("u-1"))));
        assert!(!customer.may_act_for(Some(&UserId::new("u-2"))));
        assert!(!customer.may_act_for(None));
        assert!(Actor::admin("ops").may_act_for(None));
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("user"), Some(Role::Customer));
        assert_eq!(Role::parse("root"), None);
    }
}
