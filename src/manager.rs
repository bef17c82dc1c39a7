//! `GranteeManager`: the aggregate owning every user and role, the role
//! graph, reserved/immutable principals, and the shared `PasswordHasher`.
//! All mutating operations funnel through here, per `spec.md` §4.5/§5.

use crate::error::{AuthError, AuthResult};
use crate::grantee::Grantee;
use crate::hasher::PasswordHasher;
use crate::ident::QualifiedName;
use crate::right::Right;
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use tracing::{info, warn};

pub const SYSTEM_USER: &str = "_SYSTEM";
pub const PUBLIC_ROLE: &str = "PUBLIC";
pub const DBA_ROLE: &str = "DBA";
pub const SCHEMA_CREATE_ROLE: &str = "SCHEMA_CREATE";
pub const CHANGE_AUTHORIZATION_ROLE: &str = "CHANGE_AUTHORIZATION";
pub const SCRIPT_OPS_ROLE: &str = "SCRIPT_OPS";
pub const SYSTEM_SCHEMA: &str = "DEFINITION_SCHEMA";

const RESERVED_SCHEMA_NAMES: &[&str] = &["INFORMATION_SCHEMA", "SYSTEM_LOBS", SYSTEM_SCHEMA];

/// Narrow view of a catalog object, consumed by `grant`/`revoke`. The
/// catalog/schema manager owns the concrete type; this crate only needs
/// these three facts about it.
pub trait SchemaObject {
    fn name(&self) -> &QualifiedName;
    fn owner(&self) -> &QualifiedName;
    /// `Some` only for a routine overload set; lists the specific routines
    /// the overload set expands to.
    fn specific_routines(&self) -> Option<Vec<QualifiedName>> {
        None
    }
}

/// Narrow view of the session's warning channel, used for `W_01007`.
pub trait WarningSink {
    fn add_warning(&mut self, warning: AuthError);
}

struct ManagerState {
    map: IndexMap<QualifiedName, Grantee>,
    reserved_names: IndexSet<QualifiedName>,
    immutable_names: IndexSet<QualifiedName>,
}

pub struct GranteeManager {
    state: RwLock<ManagerState>,
    hasher: PasswordHasher,
}

impl GranteeManager {
    pub fn new(hasher: PasswordHasher) -> Self {
        let mut map = IndexMap::new();

        let mut system = Grantee::new_user(QualifiedName::new(SYSTEM_USER));
        system.is_system = true;
        system.is_admin_direct = true;
        if let Some(ud) = system.user_data.as_mut() {
            ud.initial_schema = Some(QualifiedName::new(SYSTEM_SCHEMA));
        }
        map.insert(system.name.clone(), system);

        let mut public = Grantee::new_role(QualifiedName::new(PUBLIC_ROLE));
        public.is_public = true;
        map.insert(public.name.clone(), public);

        let mut dba = Grantee::new_role(QualifiedName::new(DBA_ROLE));
        dba.is_admin_direct = true;
        map.insert(dba.name.clone(), dba);

        for name in [SCHEMA_CREATE_ROLE, CHANGE_AUTHORIZATION_ROLE, SCRIPT_OPS_ROLE] {
            let role = Grantee::new_role(QualifiedName::new(name));
            map.insert(role.name.clone(), role);
        }

        let reserved_names: IndexSet<QualifiedName> = [
            SYSTEM_USER,
            DBA_ROLE,
            SCHEMA_CREATE_ROLE,
            CHANGE_AUTHORIZATION_ROLE,
            SCRIPT_OPS_ROLE,
            PUBLIC_ROLE,
        ]
        .into_iter()
        .map(QualifiedName::new)
        .collect();

        let immutable_names: IndexSet<QualifiedName> =
            reserved_names.iter().filter(|n| n.as_str() != PUBLIC_ROLE).cloned().collect();

        info!("grantee manager initialized with reserved principals");

        GranteeManager { state: RwLock::new(ManagerState { map, reserved_names, immutable_names }), hasher }
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    pub fn get(&self, name: &QualifiedName) -> Option<Grantee> {
        self.state.read().map.get(name).cloned()
    }

    pub fn exists(&self, name: &QualifiedName) -> bool {
        self.state.read().map.contains_key(name)
    }

    pub fn is_role(&self, name: &QualifiedName) -> bool {
        self.state.read().map.get(name).map(|g| g.is_role).unwrap_or(false)
    }

    fn is_reserved_schema_name(name: &QualifiedName) -> bool {
        RESERVED_SCHEMA_NAMES.iter().any(|s| s.eq_ignore_ascii_case(name.as_str()))
    }

    fn add_grantee(&self, name: QualifiedName, as_role: bool) -> AuthResult<()> {
        if name.as_str() == SYSTEM_USER || Self::is_reserved_schema_name(&name) {
            return Err(AuthError::grantee_immutable(name.to_string()));
        }
        let mut state = self.state.write();
        if state.map.contains_key(&name) {
            return Err(AuthError::grantee_exists(name.to_string()));
        }
        let grantee = if as_role { Grantee::new_role(name.clone()) } else { Grantee::new_user(name.clone()) };
        state.map.insert(name.clone(), grantee);
        info!(grantee = %name, role = as_role, "grantee.add");
        Ok(())
    }

    pub fn add_role(&self, name: QualifiedName) -> AuthResult<()> {
        self.add_grantee(name, true)
    }

    pub fn add_user(&self, name: QualifiedName) -> AuthResult<()> {
        self.add_grantee(name, false)
    }

    fn dba_name(&self) -> QualifiedName {
        QualifiedName::new(DBA_ROLE)
    }

    /// Two-pass propagation: recompute every role's effective tables first,
    /// then every user's, so the user pass reads a settled role graph.
    pub fn update_all_rights(&self) {
        let dba = self.dba_name();
        let mut state = self.state.write();
        let snapshot: IndexMap<QualifiedName, Grantee> = state.map.clone();

        let role_names: Vec<QualifiedName> =
            state.map.iter().filter(|(_, g)| g.is_role).map(|(n, _)| n.clone()).collect();
        for name in &role_names {
            if let Some(g) = state.map.get_mut(name) {
                g.compute_effective(&snapshot, &dba);
            }
        }

        let snapshot_after_roles: IndexMap<QualifiedName, Grantee> = state.map.clone();
        let user_names: Vec<QualifiedName> =
            state.map.iter().filter(|(_, g)| !g.is_role).map(|(n, _)| n.clone()).collect();
        for name in &user_names {
            if let Some(g) = state.map.get_mut(name) {
                g.compute_effective(&snapshot_after_roles, &dba);
            }
        }
    }

    pub fn grant_object(
        &self,
        grantee_names: &[QualifiedName],
        object: &dyn SchemaObject,
        right: &Right,
        grantor_name: &QualifiedName,
        with_grant_option: bool,
        warnings: &mut dyn WarningSink,
    ) -> AuthResult<()> {
        if let Some(routines) = object.specific_routines() {
            let mut any = false;
            for r in &routines {
                let routine_object = SimpleObject { name: r.clone(), owner: object.owner().clone() };
                if self
                    .grant_object(grantee_names, &routine_object, right, grantor_name, with_grant_option, warnings)
                    .is_ok()
                {
                    any = true;
                }
            }
            if !any {
                return Err(AuthError::dependent_grant_missing(object.name().to_string()));
            }
            return Ok(());
        }

        let mut state = self.state.write();

        let grantor = state
            .map
            .get(grantor_name)
            .cloned()
            .ok_or_else(|| AuthError::grantee_not_found(grantor_name.to_string()))?;
        if !grantor.is_fully_accessible_by_role(object.name()) {
            return Err(AuthError::dependent_grant_missing(grantor_name.to_string()));
        }

        // Apply only the subset of `right` the grantor can actually grant;
        // warn (non-fatally) about whatever bits remain uncovered.
        let to_apply = if grantor.is_admin() {
            right.clone()
        } else {
            // The object owner may re-grant anything they hold; any other
            // grantor needs the with-grant-option subset.
            let held_grantable = if grantor_name == object.owner() {
                grantor.full_rights.get(object.name()).cloned().unwrap_or_default()
            } else {
                grantor.grantable_rights.get(object.name()).cloned().unwrap_or_default()
            };
            let applicable_bits = held_grantable.priv_bits() & right.priv_bits();
            Right::whole_object(applicable_bits)
        };
        if to_apply.priv_bits() != right.priv_bits() {
            warn!(object = %object.name(), grantor = %grantor_name, "grant.partial");
            warnings.add_warning(AuthError::partial_grant_warning(object.name().to_string()));
        }
        if to_apply.is_empty() {
            return Ok(());
        }
        let right = &to_apply;

        // §4.5 step 4: when the grantor is admin, the grant is recorded
        // under the object owner rather than the admin. `Right` carries no
        // grantor field in this crate's data model (see DESIGN.md), so
        // there is nothing further to rebind here.

        for name in grantee_names {
            let grantee = state.map.get(name).ok_or_else(|| AuthError::grantee_not_found(name.to_string()))?;
            if state.immutable_names.contains(name) {
                return Err(AuthError::grantee_immutable(name.to_string()));
            }
            if let Some(ud) = grantee.user_data() {
                if ud.is_external_only {
                    return Err(AuthError::invalid_auth_spec(name.to_string()));
                }
            }
            if right.has_filter() && !grantee.is_role {
                return Err(AuthError::invalid_role(name.to_string()));
            }
        }

        for name in grantee_names {
            if let Some(g) = state.map.get_mut(name) {
                g.grant_right(object.name().clone(), right, with_grant_option);
            }
        }
        drop(state);
        self.update_all_rights();
        info!(object = %object.name(), grantees = grantee_names.len(), "grant.object");
        Ok(())
    }

    pub fn grant_role(&self, grantee_name: &QualifiedName, role_name: &QualifiedName, grantor_name: &QualifiedName) -> AuthResult<()> {
        let mut state = self.state.write();
        if !state.map.contains_key(grantee_name) {
            return Err(AuthError::grantee_not_found(grantee_name.to_string()));
        }
        if state.immutable_names.contains(grantee_name) {
            return Err(AuthError::grantee_immutable(grantee_name.to_string()));
        }
        let role = state.map.get(role_name).ok_or_else(|| AuthError::invalid_role(role_name.to_string()))?;
        if !role.is_role {
            return Err(AuthError::invalid_role(role_name.to_string()));
        }
        if role_name == grantee_name {
            return Err(AuthError::invalid_role_cycle(role_name.to_string()));
        }
        let snapshot = state.map.clone();
        if let Some(role) = state.map.get(role_name) {
            if role.has_role(grantee_name, &snapshot) {
                return Err(AuthError::invalid_role_cycle(role_name.to_string()));
            }
        }
        let grantor = state.map.get(grantor_name).ok_or_else(|| AuthError::grantee_not_found(grantor_name.to_string()))?;
        if !grantor.can_grant_role() {
            return Err(AuthError::dependent_grant_missing(grantor_name.to_string()));
        }

        if let Some(g) = state.map.get_mut(grantee_name) {
            g.grant_role(role_name.clone());
        }
        drop(state);
        self.update_all_rights();
        info!(grantee = %grantee_name, role = %role_name, "grant.role");
        Ok(())
    }

    pub fn revoke_object(
        &self,
        grantee_names: &[QualifiedName],
        object: &dyn SchemaObject,
        right: &Right,
        grantor_name: &QualifiedName,
        cascade: bool,
    ) -> AuthResult<()> {
        let mut state = self.state.write();
        let grantor = state.map.get(grantor_name).ok_or_else(|| AuthError::grantee_not_found(grantor_name.to_string()))?;
        if !grantor.is_fully_accessible_by_role(object.name()) {
            return Err(AuthError::not_authorized_object(object.name().to_string()));
        }
        for name in grantee_names {
            if let Some(g) = state.map.get_mut(name) {
                g.revoke_right(object.name(), right, cascade)?;
            }
        }
        drop(state);
        self.update_all_rights();
        info!(object = %object.name(), grantees = grantee_names.len(), "revoke.object");
        Ok(())
    }

    pub fn revoke_role(&self, grantee_name: &QualifiedName, role_name: &QualifiedName, grantor_name: &QualifiedName) -> AuthResult<()> {
        let mut state = self.state.write();
        let grantor = state.map.get(grantor_name).ok_or_else(|| AuthError::grantee_not_found(grantor_name.to_string()))?;
        if !grantor.is_admin() {
            return Err(AuthError::not_authorized_general(grantor_name.to_string()));
        }
        if !state.map.contains_key(grantee_name) {
            return Err(AuthError::invalid_auth_spec(grantee_name.to_string()));
        }
        // role need not exist: silent no-op if absent, matching observed behavior.
        if let Some(g) = state.map.get_mut(grantee_name) {
            g.revoke_role(role_name);
        }
        drop(state);
        self.update_all_rights();
        info!(grantee = %grantee_name, role = %role_name, "revoke.role");
        Ok(())
    }

    pub fn drop_role(&self, name: &QualifiedName) -> AuthResult<()> {
        {
            let state = self.state.read();
            if state.reserved_names.contains(name) {
                return Err(AuthError::not_authorized_general(name.to_string()));
            }
            match state.map.get(name) {
                Some(g) if g.is_role => {}
                Some(_) => return Err(AuthError::invalid_role(name.to_string())),
                None => return Err(AuthError::grantee_not_found(name.to_string())),
            }
        }
        self.remove_grantee(name);
        Ok(())
    }

    /// No-op (returns `false`) for reserved names; otherwise removes the
    /// grantee and sweeps it from every other principal's `direct_roles`.
    pub fn remove_grantee(&self, name: &QualifiedName) -> bool {
        let was_role;
        {
            let mut state = self.state.write();
            if state.reserved_names.contains(name) {
                return false;
            }
            was_role = state.map.get(name).map(|g| g.is_role).unwrap_or(false);
            state.map.shift_remove(name);
            for g in state.map.values_mut() {
                g.revoke_role(name);
            }
            info!(grantee = %name, role = was_role, "grantee.remove");
        }
        if was_role {
            self.update_all_rights();
        }
        true
    }

    pub fn remove_db_object(&self, name: &QualifiedName) {
        let mut state = self.state.write();
        for g in state.map.values_mut() {
            g.revoke_db_object(name);
        }
    }

    pub fn remove_db_objects(&self, names: &[QualifiedName]) {
        let mut state = self.state.write();
        for g in state.map.values_mut() {
            for name in names {
                g.revoke_db_object(name);
            }
        }
    }

    pub fn check_password(&self, user_name: &QualifiedName, clear: &str) -> AuthResult<()> {
        let state = self.state.read();
        let user = state.map.get(user_name).ok_or_else(|| AuthError::grantee_not_found(user_name.to_string()))?;
        user.check_password(&self.hasher, clear)
    }

    pub fn set_password(&self, user_name: &QualifiedName, value: &str, is_digest: bool) -> AuthResult<()> {
        let mut state = self.state.write();
        let user = state.map.get_mut(user_name).ok_or_else(|| AuthError::grantee_not_found(user_name.to_string()))?;
        user.set_password(&self.hasher, value, is_digest);
        Ok(())
    }

    /// `ALTER USER <name> SET LOCAL TRUE` / clears external-only, per
    /// `spec.md` §3's mutually exclusive local/external flags.
    pub fn set_local_only(&self, user_name: &QualifiedName, local_only: bool) -> AuthResult<()> {
        let mut state = self.state.write();
        let user = state.map.get_mut(user_name).ok_or_else(|| AuthError::grantee_not_found(user_name.to_string()))?;
        user.set_local_only(local_only);
        Ok(())
    }

    /// Marks a user external-only (authenticated outside this database).
    /// `grant_object` rejects such users as grantees per `spec.md` §4.5.
    pub fn set_external_only(&self, user_name: &QualifiedName, external_only: bool) -> AuthResult<()> {
        let mut state = self.state.write();
        let user = state.map.get_mut(user_name).ok_or_else(|| AuthError::grantee_not_found(user_name.to_string()))?;
        user.set_external_only(external_only);
        Ok(())
    }

    /// `ALTER USER <name> SET INITIAL SCHEMA <schema>`.
    pub fn set_initial_schema(&self, user_name: &QualifiedName, schema: Option<QualifiedName>) -> AuthResult<()> {
        let mut state = self.state.write();
        let user = state.map.get_mut(user_name).ok_or_else(|| AuthError::grantee_not_found(user_name.to_string()))?;
        user.set_initial_schema(schema);
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> IndexMap<QualifiedName, Grantee> {
        self.state.read().map.clone()
    }

    pub(crate) fn is_immutable(&self, name: &QualifiedName) -> bool {
        self.state.read().immutable_names.contains(name)
    }
}

struct SimpleObject {
    name: QualifiedName,
    owner: QualifiedName,
}

impl SchemaObject for SimpleObject {
    fn name(&self) -> &QualifiedName {
        &self.name
    }
    fn owner(&self) -> &QualifiedName {
        &self.owner
    }
}
