//! DDL serializer: reconstructs `CREATE ROLE`/`CREATE USER`/`GRANT`
//! statements from the current state of a `GranteeManager`, in stable,
//! insertion-preserving order, per `spec.md` §4.5/§6.

use crate::grantee::Grantee;
use crate::ident::quote_ident;
use crate::manager::{GranteeManager, DBA_ROLE, PUBLIC_ROLE};
use crate::right::{privilege_name, Privileges};

fn is_emittable_role(g: &Grantee, manager: &GranteeManager) -> bool {
    g.is_role && !manager.is_immutable(&g.name) && g.name.as_str() != PUBLIC_ROLE
}

fn is_emittable_user(g: &Grantee, manager: &GranteeManager) -> bool {
    !g.is_role
        && !g.is_system
        && !manager.is_immutable(&g.name)
        && !g.user_data().map(|u| u.is_external_only).unwrap_or(false)
}

/// `getSQLArray()`: `CREATE ROLE`/`CREATE USER` (+ LOCAL flag) statements.
pub fn get_sql_array(manager: &GranteeManager) -> Vec<String> {
    let snapshot = manager.snapshot();
    let mut out = Vec::new();

    for g in snapshot.values() {
        if is_emittable_role(g, manager) {
            out.push(format!("CREATE ROLE {}", quote_ident(g.name.as_str())));
        }
    }

    for g in snapshot.values() {
        if is_emittable_user(g, manager) {
            if let Some(sql) = g.get_sql() {
                out.push(sql);
            }
            if let Some(sql) = g.get_local_user_sql() {
                out.push(sql);
            }
            if let Some(sql) = g.get_initial_schema_sql() {
                out.push(sql);
            }
        }
    }

    out
}

fn right_clause(right: &crate::right::Right) -> String {
    let mut names: Vec<&'static str> = Privileges::ALL
        .single_bits()
        .filter(|p| right.has(*p))
        .map(privilege_name)
        .collect();
    names.sort();
    names.join(", ")
}

/// `getRightsSQLArray()`: `GRANT ...` statements reconstructing direct
/// rights and role memberships, per non-immutable, non-external-only
/// grantee, in `map`/`roleMap` insertion order.
pub fn get_rights_sql_array(manager: &GranteeManager) -> Vec<String> {
    let snapshot = manager.snapshot();
    let mut out = Vec::new();

    for g in snapshot.values() {
        if manager.is_immutable(&g.name) {
            continue;
        }
        if !g.is_role && g.user_data().map(|u| u.is_external_only).unwrap_or(false) {
            continue;
        }

        for (object, right) in &g.direct_rights {
            if right.is_empty() {
                continue;
            }
            let clause = right_clause(right);
            if clause.is_empty() {
                continue;
            }
            let with_grant_option = g
                .direct_grantable
                .get(object)
                .map(|gr| gr.priv_bits() == right.priv_bits() && !gr.is_empty())
                .unwrap_or(false);
            let mut stmt = format!(
                "GRANT {} ON {} TO {}",
                clause,
                quote_ident(object.as_str()),
                quote_ident(g.name.as_str())
            );
            if with_grant_option {
                stmt.push_str(" WITH GRANT OPTION");
            }
            out.push(stmt);
        }

        for role in &g.direct_roles {
            out.push(format!("GRANT {} TO {}", quote_ident(role.as_str()), quote_ident(g.name.as_str())));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::PasswordHasher;
    use crate::ident::QualifiedName;
    use crate::manager::{SchemaObject, WarningSink};
    use crate::right::Right;

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
    struct NoopSink;
    impl WarningSink for NoopSink {
        fn add_warning(&mut self, _warning: crate::error::AuthError) {}
    }

    fn n(s: &str) -> QualifiedName {
        QualifiedName::new(s)
    }

    #[test]
    fn create_role_and_user_statements() {
        let m = GranteeManager::new(PasswordHasher::default_algorithm());
        m.add_role(n("analyst")).unwrap();
        m.add_user(n("alice")).unwrap();
        m.set_password(&n("alice"), "s3cret", false).unwrap();

        let stmts = get_sql_array(&m);
        assert!(stmts.iter().any(|s| s == "CREATE ROLE analyst"));
        assert!(stmts.iter().any(|s| s.starts_with("CREATE USER alice PASSWORD DIGEST '")));
        assert!(!stmts.iter().any(|s| s.contains(DBA_ROLE)));
    }

    #[test]
    fn grant_statements_reconstruct_direct_rights_and_roles() {
        let m = GranteeManager::new(PasswordHasher::default_algorithm());
        m.add_role(n("analyst")).unwrap();
        m.add_user(n("alice")).unwrap();
        let t1 = SimpleObject { name: n("t1"), owner: n(DBA_ROLE) };
        m.grant_object(&[n("analyst")], &t1, &Right::whole_object(Privileges::SELECT), &n(DBA_ROLE), false, &mut NoopSink)
            .unwrap();
        m.grant_role(&n("alice"), &n("analyst"), &n(DBA_ROLE)).unwrap();

        let stmts = get_rights_sql_array(&m);
        assert!(stmts.iter().any(|s| s == "GRANT SELECT ON t1 TO analyst"));
        assert!(stmts.iter().any(|s| s == "GRANT analyst TO alice"));
    }

    #[test]
    fn builtin_roles_and_system_user_never_emitted() {
        let m = GranteeManager::new(PasswordHasher::default_algorithm());
        let stmts = get_sql_array(&m);
        assert!(stmts.is_empty());
    }
}
