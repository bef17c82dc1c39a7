//! `Grantee` and its `User` specialization, modeled per `spec.md` §9 as a
//! single tagged struct rather than a type hierarchy: shared capability
//! set (name, direct/effective rights, direct roles, admin flag) plus an
//! optional `UserData` payload for the user-only fields.

use crate::error::{AuthError, AuthResult};
use crate::hasher::PasswordHasher;
use crate::ident::QualifiedName;
use crate::right::{Privileges, Right};
use indexmap::{IndexMap, IndexSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GranteeKind {
    Role,
    User,
}

#[derive(Debug, Clone)]
pub struct UserData {
    pub password_digest: Option<String>,
    pub is_local_only: bool,
    pub is_external_only: bool,
    pub initial_schema: Option<QualifiedName>,
}

impl Default for UserData {
    fn default() -> Self {
        UserData { password_digest: None, is_local_only: false, is_external_only: false, initial_schema: None }
    }
}

#[derive(Debug, Clone)]
pub struct Grantee {
    pub name: QualifiedName,
    pub is_role: bool,
    pub is_public: bool,
    pub is_system: bool,
    pub is_admin_direct: bool,

    pub direct_rights: IndexMap<QualifiedName, Right>,
    /// The with-grant-option subset of `direct_rights`. Not named
    /// explicitly in `spec.md` §3, but structurally required to recompute
    /// `grantable_rights` (see SPEC_FULL.md §3).
    pub direct_grantable: IndexMap<QualifiedName, Right>,
    pub direct_roles: IndexSet<QualifiedName>,

    pub full_rights: IndexMap<QualifiedName, Right>,
    pub grantable_rights: IndexMap<QualifiedName, Right>,
    /// Whether the DBA role is reachable transitively through `direct_roles`.
    pub effective_admin: bool,

    pub user_data: Option<UserData>,
}

impl Grantee {
    pub fn new_role(name: QualifiedName) -> Self {
        Grantee {
            name,
            is_role: true,
            is_public: false,
            is_system: false,
            is_admin_direct: false,
            direct_rights: IndexMap::new(),
            direct_grantable: IndexMap::new(),
            direct_roles: IndexSet::new(),
            full_rights: IndexMap::new(),
            grantable_rights: IndexMap::new(),
            effective_admin: false,
            user_data: None,
        }
    }

    pub fn new_user(name: QualifiedName) -> Self {
        let mut g = Grantee::new_role(name);
        g.is_role = false;
        g.user_data = Some(UserData::default());
        g
    }

    pub fn kind(&self) -> GranteeKind {
        if self.is_role {
            GranteeKind::Role
        } else {
            GranteeKind::User
        }
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin_direct || self.effective_admin
    }

    pub fn is_accessible(&self, object: &QualifiedName) -> bool {
        if self.is_admin() {
            return true;
        }
        self.full_rights.get(object).map(|r| !r.is_empty()).unwrap_or(false)
    }

    pub fn is_grantable(&self, object: &QualifiedName, right: &Right) -> bool {
        self.grantable_rights.get(object).map(|r| r.contains(right)).unwrap_or(false)
    }

    /// §4.2's "admins may grant any role; otherwise... (implementation may
    /// simplify to admin-only)". This crate takes the documented
    /// simplification — see DESIGN.md Open Questions.
    pub fn can_grant_role(&self) -> bool {
        self.is_admin()
    }

    pub fn is_fully_accessible_by_role(&self, object: &QualifiedName) -> bool {
        if self.is_admin() {
            return true;
        }
        self.full_rights.get(object).map(|r| !r.is_empty()).unwrap_or(false)
    }

    pub fn check_right(&self, object: &QualifiedName, required: Privileges) -> AuthResult<()> {
        if self.is_admin() {
            return Ok(());
        }
        let held = self.full_rights.get(object);
        let ok = held.map(|r| r.has(required)).unwrap_or(false);
        if ok {
            Ok(())
        } else {
            Err(AuthError::not_authorized_object(object.as_str()))
        }
    }

    pub fn check_select(&self, object: &QualifiedName) -> AuthResult<()> {
        self.check_right(object, Privileges::SELECT)
    }
    pub fn check_insert(&self, object: &QualifiedName) -> AuthResult<()> {
        self.check_right(object, Privileges::INSERT)
    }
    pub fn check_update(&self, object: &QualifiedName) -> AuthResult<()> {
        self.check_right(object, Privileges::UPDATE)
    }
    pub fn check_delete(&self, object: &QualifiedName) -> AuthResult<()> {
        self.check_right(object, Privileges::DELETE)
    }
    pub fn check_references(&self, object: &QualifiedName) -> AuthResult<()> {
        self.check_right(object, Privileges::REFERENCES)
    }
    pub fn check_trigger(&self, object: &QualifiedName) -> AuthResult<()> {
        self.check_right(object, Privileges::TRIGGER)
    }
    pub fn check_execute(&self, object: &QualifiedName) -> AuthResult<()> {
        self.check_right(object, Privileges::EXECUTE)
    }
    pub fn check_usage(&self, object: &QualifiedName) -> AuthResult<()> {
        self.check_right(object, Privileges::USAGE)
    }

    // --- write-side contract: called only by GranteeManager ---

    pub fn grant_right(&mut self, object: QualifiedName, right: &Right, with_grant_option: bool) {
        let merged = self.direct_rights.get(&object).map(|r| r.add(right)).unwrap_or_else(|| right.clone());
        self.direct_rights.insert(object.clone(), merged);
        if with_grant_option {
            let merged_grantable =
                self.direct_grantable.get(&object).map(|r| r.add(right)).unwrap_or_else(|| right.clone());
            self.direct_grantable.insert(object, merged_grantable);
        }
    }

    pub fn revoke_right(&mut self, object: &QualifiedName, right: &Right, cascade: bool) -> AuthResult<()> {
        if let Some(existing) = self.direct_rights.get(object).cloned() {
            let remaining = existing.remove(right, cascade, object.as_str())?;
            if remaining.is_empty() {
                self.direct_rights.shift_remove(object);
            } else {
                self.direct_rights.insert(object.clone(), remaining);
            }
        }
        if let Some(existing) = self.direct_grantable.get(object).cloned() {
            if let Ok(remaining) = existing.remove(right, true, object.as_str()) {
                if remaining.is_empty() {
                    self.direct_grantable.shift_remove(object);
                } else {
                    self.direct_grantable.insert(object.clone(), remaining);
                }
            }
        }
        Ok(())
    }

    pub fn revoke_db_object(&mut self, object: &QualifiedName) {
        self.direct_rights.shift_remove(object);
        self.direct_grantable.shift_remove(object);
        self.full_rights.shift_remove(object);
        self.grantable_rights.shift_remove(object);
    }

    pub fn grant_role(&mut self, role: QualifiedName) {
        self.direct_roles.insert(role);
    }

    pub fn revoke_role(&mut self, role: &QualifiedName) {
        self.direct_roles.shift_remove(role);
    }

    pub fn has_role(&self, role: &QualifiedName, all: &IndexMap<QualifiedName, Grantee>) -> bool {
        let mut visited: IndexSet<QualifiedName> = IndexSet::new();
        let mut stack: Vec<QualifiedName> = self.direct_roles.iter().cloned().collect();
        while let Some(next) = stack.pop() {
            if &next == role {
                return true;
            }
            if !visited.insert(next.clone()) {
                continue;
            }
            if let Some(g) = all.get(&next) {
                stack.extend(g.direct_roles.iter().cloned());
            }
        }
        false
    }

    /// Recompute `full_rights`/`grantable_rights`/`effective_admin` as the
    /// union of `direct_rights` (resp. `direct_grantable`) with every
    /// `direct_rights` reachable through `direct_roles`, walked with a
    /// visited-by-name set so diamonds contribute once. Defining the walk
    /// purely over `direct_*` rather than cached `full_rights` means the
    /// recomputation order across grantees does not matter.
    pub fn compute_effective(&mut self, all: &IndexMap<QualifiedName, Grantee>, dba_name: &QualifiedName) {
        let mut full: IndexMap<QualifiedName, Right> = self.direct_rights.clone();
        let mut grantable: IndexMap<QualifiedName, Right> = self.direct_grantable.clone();
        let mut effective_admin = false;
        let mut visited: IndexSet<QualifiedName> = IndexSet::new();
        let mut stack: Vec<QualifiedName> = self.direct_roles.iter().cloned().collect();
        while let Some(role_name) = stack.pop() {
            if !visited.insert(role_name.clone()) {
                continue;
            }
            if &role_name == dba_name {
                effective_admin = true;
            }
            if let Some(role) = all.get(&role_name) {
                if role.is_admin_direct {
                    effective_admin = true;
                }
                for (obj, right) in &role.direct_rights {
                    let merged = full.get(obj).map(|r| r.add(right)).unwrap_or_else(|| right.clone());
                    full.insert(obj.clone(), merged);
                }
                for (obj, right) in &role.direct_grantable {
                    let merged = grantable.get(obj).map(|r| r.add(right)).unwrap_or_else(|| right.clone());
                    grantable.insert(obj.clone(), merged);
                }
                stack.extend(role.direct_roles.iter().cloned());
            }
        }
        self.full_rights = full;
        self.grantable_rights = grantable;
        self.effective_admin = effective_admin;
    }

    // --- User-only operations ---

    pub fn user_data(&self) -> Option<&UserData> {
        self.user_data.as_ref()
    }

    /// Set `isLocalOnly`/`isExternalOnly`; mutually exclusive per `spec.md`
    /// §3, so setting one clears the other.
    pub fn set_local_only(&mut self, local_only: bool) {
        if let Some(ud) = self.user_data.as_mut() {
            ud.is_local_only = local_only;
            if local_only {
                ud.is_external_only = false;
            }
        }
    }

    pub fn set_external_only(&mut self, external_only: bool) {
        if let Some(ud) = self.user_data.as_mut() {
            ud.is_external_only = external_only;
            if external_only {
                ud.is_local_only = false;
            }
        }
    }

    pub fn set_initial_schema(&mut self, schema: Option<QualifiedName>) {
        if let Some(ud) = self.user_data.as_mut() {
            ud.initial_schema = schema;
        }
    }

    pub fn set_password(&mut self, hasher: &PasswordHasher, value: &str, is_digest: bool) {
        let digest = if is_digest { value.to_string() } else { hasher.digest(value) };
        if let Some(ud) = self.user_data.as_mut() {
            ud.password_digest = Some(digest);
        }
    }

    pub fn check_password(&self, hasher: &PasswordHasher, clear: &str) -> AuthResult<()> {
        let ud = self.user_data.as_ref().ok_or_else(|| AuthError::invalid_auth_spec(self.name.to_string()))?;
        let expected = ud.password_digest.as_deref().unwrap_or("");
        if hasher.digest(clear) == expected {
            Ok(())
        } else {
            Err(AuthError::invalid_auth_spec(self.name.to_string()))
        }
    }

    pub fn get_sql(&self) -> Option<String> {
        let ud = self.user_data.as_ref()?;
        let digest = ud.password_digest.as_deref().unwrap_or("");
        Some(format!(
            "CREATE USER {} PASSWORD DIGEST '{}'",
            crate::ident::quote_ident(self.name.as_str()),
            digest
        ))
    }

    pub fn get_local_user_sql(&self) -> Option<String> {
        let ud = self.user_data.as_ref()?;
        if ud.is_local_only {
            Some(format!("ALTER USER {} SET LOCAL TRUE", crate::ident::quote_ident(self.name.as_str())))
        } else {
            None
        }
    }

    pub fn get_initial_schema_sql(&self) -> Option<String> {
        let ud = self.user_data.as_ref()?;
        let schema = ud.initial_schema.as_ref()?;
        Some(format!(
            "ALTER USER {} SET INITIAL SCHEMA {}",
            crate::ident::quote_ident(self.name.as_str()),
            crate::ident::quote_ident(schema.as_str())
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(s: &str) -> QualifiedName {
        QualifiedName::new(s)
    }

    #[test]
    fn new_role_and_user_have_expected_defaults() {
        let role = Grantee::new_role(n("R1"));
        assert!(role.is_role);
        assert!(role.user_data.is_none());

        let user = Grantee::new_user(n("ALICE"));
        assert!(!user.is_role);
        assert!(user.user_data.is_some());
    }

    #[test]
    fn compute_effective_unions_across_role_chain() {
        let mut all = IndexMap::new();
        let mut r1 = Grantee::new_role(n("R1"));
        r1.direct_rights.insert(n("T1"), Right::whole_object(Privileges::SELECT));
        all.insert(n("R1"), r1);

        let mut user = Grantee::new_user(n("ALICE"));
        user.direct_roles.insert(n("R1"));
        user.compute_effective(&all, &n("DBA"));

        assert!(user.is_accessible(&n("T1")));
        assert!(user.check_select(&n("T1")).is_ok());
        assert!(user.check_insert(&n("T1")).is_err());
    }

    #[test]
    fn effective_admin_propagates_through_dba_role() {
        let mut all = IndexMap::new();
        let mut dba = Grantee::new_role(n("DBA"));
        dba.is_admin_direct = true;
        all.insert(n("DBA"), dba);

        let mut user = Grantee::new_user(n("ALICE"));
        user.direct_roles.insert(n("DBA"));
        user.compute_effective(&all, &n("DBA"));
        assert!(user.is_admin());
    }

    #[test]
    fn password_roundtrip() {
        let hasher = PasswordHasher::default_algorithm();
        let mut user = Grantee::new_user(n("ALICE"));
        user.set_password(&hasher, "s3cret", false);
        assert!(user.check_password(&hasher, "s3cret").is_ok());
        assert!(user.check_password(&hasher, "wrong").is_err());
    }

    #[test]
    fn get_sql_renders_digest() {
        let hasher = PasswordHasher::default_algorithm();
        let mut user = Grantee::new_user(n("alice"));
        user.set_password(&hasher, "s3cret", false);
        let sql = user.get_sql().unwrap();
        assert!(sql.starts_with("CREATE USER alice PASSWORD DIGEST '"));
    }
}
