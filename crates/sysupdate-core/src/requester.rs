use std::collections::BTreeSet;

pub const SUPER_ADMIN_ROLE: &str = "Super Admin";

/// Roles held by whoever triggered the update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requester {
    roles: BTreeSet<String>,
}

impl Requester {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles
                .into_iter()
                .map(|role| {
                    let role: String = role.into();
                    role.trim().to_string()
                })
                .filter(|role| !role.is_empty())
                .collect(),
        }
    }

    pub fn super_admin() -> Self {
        Self::new([SUPER_ADMIN_ROLE])
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn is_super_admin(&self) -> bool {
        self.has_role(SUPER_ADMIN_ROLE)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }
}
