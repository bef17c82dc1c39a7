//! End-to-end authorization scenarios exercised against `GranteeManager`
//! directly, mirroring the concrete scenarios enumerated in the spec's
//! testable-properties section.

use sql_authz::right::Privileges;
use sql_authz::{GranteeManager, PasswordHasher, QualifiedName, Right};
use sql_authz::manager::{SchemaObject, WarningSink, DBA_ROLE};

struct TestObject {
    name: QualifiedName,
    owner: QualifiedName,
}

impl SchemaObject for TestObject {
    fn name(&self) -> &QualifiedName {
        &self.name
    }
    fn owner(&self) -> &QualifiedName {
        &self.owner
    }
}

#[derive(Default)]
struct RecordingSink {
    warnings: Vec<sql_authz::AuthError>,
}

impl WarningSink for RecordingSink {
    fn add_warning(&mut self, warning: sql_authz::AuthError) {
        self.warnings.push(warning);
    }
}

fn n(s: &str) -> QualifiedName {
    QualifiedName::new(s)
}

fn fresh_manager() -> GranteeManager {
    GranteeManager::new(PasswordHasher::default_algorithm())
}

#[test]
fn scenario_create_user_check_password() {
    let m = fresh_manager();
    m.add_user(n("ALICE")).unwrap();
    m.set_password(&n("ALICE"), "s3cret", false).unwrap();

    assert!(m.check_password(&n("ALICE"), "s3cret").is_ok());
    let err = m.check_password(&n("ALICE"), "wrong").unwrap_err();
    assert_eq!(err.code_str(), "X_28000");
}

#[test]
fn scenario_cycle_rejected() {
    let m = fresh_manager();
    for r in ["R1", "R2", "R3"] {
        m.add_role(n(r)).unwrap();
    }
    m.grant_role(&n("R2"), &n("R1"), &n(DBA_ROLE)).unwrap();
    m.grant_role(&n("R3"), &n("R2"), &n(DBA_ROLE)).unwrap();

    let err = m.grant_role(&n("R1"), &n("R3"), &n(DBA_ROLE)).unwrap_err();
    assert_eq!(err.code_str(), "X_0P501");
}

#[test]
fn scenario_role_revocation_propagates() {
    let m = fresh_manager();
    m.add_role(n("R")).unwrap();
    m.add_user(n("U")).unwrap();
    let t1 = TestObject { name: n("T"), owner: n(DBA_ROLE) };
    let mut sink = RecordingSink::default();

    m.grant_object(&[n("R")], &t1, &Right::whole_object(Privileges::SELECT), &n(DBA_ROLE), false, &mut sink)
        .unwrap();
    m.grant_role(&n("U"), &n("R"), &n(DBA_ROLE)).unwrap();
    assert!(m.get(&n("U")).unwrap().is_accessible(&n("T")));

    m.revoke_role(&n("U"), &n("R"), &n(DBA_ROLE)).unwrap();
    assert!(!m.get(&n("U")).unwrap().is_accessible(&n("T")));
    assert!(m.get(&n("U")).unwrap().full_rights.get(&n("T")).is_none());
}

#[test]
fn scenario_drop_role_sweeps_holders() {
    let m = fresh_manager();
    m.add_role(n("R")).unwrap();
    m.add_user(n("U1")).unwrap();
    m.add_user(n("U2")).unwrap();
    m.grant_role(&n("U1"), &n("R"), &n(DBA_ROLE)).unwrap();
    m.grant_role(&n("U2"), &n("R"), &n(DBA_ROLE)).unwrap();

    m.drop_role(&n("R")).unwrap();

    assert!(!m.get(&n("U1")).unwrap().direct_roles.contains(&n("R")));
    assert!(!m.get(&n("U2")).unwrap().direct_roles.contains(&n("R")));
    assert!(!m.exists(&n("R")));
}

#[test]
fn scenario_immutable_principals_are_protected() {
    let m = fresh_manager();
    assert_eq!(m.drop_role(&n(DBA_ROLE)).unwrap_err().code_str(), "X_42507");
    assert_eq!(m.add_role(n("_SYSTEM")).unwrap_err().code_str(), "X_28502");
}

#[test]
fn scenario_partial_grant_warns_without_failing() {
    let m = fresh_manager();
    m.add_user(n("GRANTOR")).unwrap();
    m.add_user(n("U")).unwrap();
    let t1 = TestObject { name: n("T"), owner: n("GRANTOR") };
    let mut noop = RecordingSink::default();

    // GRANTOR holds SELECT (but not INSERT) on T, granted by an admin.
    m.grant_object(&[n("GRANTOR")], &t1, &Right::whole_object(Privileges::SELECT), &n(DBA_ROLE), false, &mut noop)
        .unwrap();

    let mut sink = RecordingSink::default();
    let both = Right::whole_object(Privileges::SELECT | Privileges::INSERT);
    m.grant_object(&[n("U")], &t1, &both, &n("GRANTOR"), false, &mut sink).unwrap();

    assert!(!sink.warnings.is_empty(), "expected a partial-grant warning");
    let granted = m.get(&n("U")).unwrap();
    let right = granted.direct_rights.get(&n("T")).unwrap();
    assert!(right.has(Privileges::SELECT));
    assert!(!right.has(Privileges::INSERT));
}

#[test]
fn property_acyclic_roles_hold_after_many_grants() {
    let m = fresh_manager();
    for r in ["A", "B", "C", "D"] {
        m.add_role(n(r)).unwrap();
    }
    m.grant_role(&n("B"), &n("A"), &n(DBA_ROLE)).unwrap();
    m.grant_role(&n("C"), &n("B"), &n(DBA_ROLE)).unwrap();
    m.grant_role(&n("D"), &n("C"), &n(DBA_ROLE)).unwrap();

    for name in ["A", "B", "C", "D"] {
        let g = m.get(&n(name)).unwrap();
        assert!(!g.direct_roles.contains(&n(name)));
    }
    assert_eq!(m.grant_role(&n("A"), &n("D"), &n(DBA_ROLE)).unwrap_err().code_str(), "X_0P501");
}

#[test]
fn property_idempotent_grant() {
    let m = fresh_manager();
    m.add_user(n("U")).unwrap();
    let t1 = TestObject { name: n("T"), owner: n(DBA_ROLE) };
    let mut sink = RecordingSink::default();

    m.grant_object(&[n("U")], &t1, &Right::whole_object(Privileges::SELECT), &n(DBA_ROLE), false, &mut sink)
        .unwrap();
    let first = m.get(&n("U")).unwrap().full_rights.get(&n("T")).cloned();

    m.grant_object(&[n("U")], &t1, &Right::whole_object(Privileges::SELECT), &n(DBA_ROLE), false, &mut sink)
        .unwrap();
    let second = m.get(&n("U")).unwrap().full_rights.get(&n("T")).cloned();

    assert_eq!(first, second);
}

#[test]
fn property_monotone_closure_through_role_chain() {
    let m = fresh_manager();
    m.add_role(n("R")).unwrap();
    m.add_user(n("U")).unwrap();
    let t1 = TestObject { name: n("T"), owner: n(DBA_ROLE) };
    let mut sink = RecordingSink::default();

    m.grant_object(&[n("R")], &t1, &Right::whole_object(Privileges::SELECT), &n(DBA_ROLE), false, &mut sink)
        .unwrap();
    m.grant_role(&n("U"), &n("R"), &n(DBA_ROLE)).unwrap();

    let role_rights = m.get(&n("R")).unwrap().full_rights.get(&n("T")).cloned().unwrap();
    let user_rights = m.get(&n("U")).unwrap().full_rights.get(&n("T")).cloned().unwrap();
    assert!(user_rights.contains(&role_rights));
}

#[test]
fn property_drop_sweep_removes_every_direct_and_effective_entry() {
    let m = fresh_manager();
    m.add_role(n("R")).unwrap();
    m.add_user(n("U")).unwrap();
    let t1 = TestObject { name: n("T"), owner: n(DBA_ROLE) };
    let mut sink = RecordingSink::default();

    m.grant_object(&[n("U"), n("R")], &t1, &Right::whole_object(Privileges::SELECT), &n(DBA_ROLE), false, &mut sink)
        .unwrap();
    m.grant_role(&n("U"), &n("R"), &n(DBA_ROLE)).unwrap();

    m.remove_db_object(&n("T"));

    assert!(m.get(&n("U")).unwrap().direct_rights.get(&n("T")).is_none());
    assert!(m.get(&n("R")).unwrap().direct_rights.get(&n("T")).is_none());
    assert!(m.get(&n("U")).unwrap().full_rights.get(&n("T")).is_none());
}

#[test]
fn property_grantee_removal_clears_from_every_role_list() {
    let m = fresh_manager();
    m.add_role(n("R")).unwrap();
    m.add_user(n("U")).unwrap();
    m.grant_role(&n("U"), &n("R"), &n(DBA_ROLE)).unwrap();

    assert!(m.remove_grantee(&n("R")));
    assert!(!m.get(&n("U")).unwrap().direct_roles.contains(&n("R")));
}

#[test]
fn ddl_round_trip_is_stable_across_repeated_calls() {
    let m = fresh_manager();
    m.add_role(n("analyst")).unwrap();
    m.add_user(n("alice")).unwrap();
    m.set_password(&n("alice"), "s3cret", false).unwrap();
    let t1 = TestObject { name: n("t1"), owner: n(DBA_ROLE) };
    let mut sink = RecordingSink::default();
    m.grant_object(&[n("analyst")], &t1, &Right::whole_object(Privileges::SELECT), &n(DBA_ROLE), false, &mut sink)
        .unwrap();
    m.grant_role(&n("alice"), &n("analyst"), &n(DBA_ROLE)).unwrap();

    let first_create = sql_authz::get_sql_array(&m);
    let first_rights = sql_authz::get_rights_sql_array(&m);
    let second_create = sql_authz::get_sql_array(&m);
    let second_rights = sql_authz::get_rights_sql_array(&m);

    assert_eq!(first_create, second_create);
    assert_eq!(first_rights, second_rights);
    assert!(first_create.iter().any(|s| s == "CREATE ROLE analyst"));
    assert!(first_rights.iter().any(|s| s == "GRANT SELECT ON t1 TO analyst"));
    assert!(first_rights.iter().any(|s| s == "GRANT analyst TO alice"));
}

#[test]
fn external_only_user_cannot_be_granted_and_is_excluded_from_ddl() {
    let m = fresh_manager();
    m.add_user(n("EXT")).unwrap();
    m.set_external_only(&n("EXT"), true).unwrap();
    m.set_password(&n("EXT"), "s3cret", false).unwrap();

    let t1 = TestObject { name: n("T"), owner: n(DBA_ROLE) };
    let mut sink = RecordingSink::default();
    let err = m
        .grant_object(&[n("EXT")], &t1, &Right::whole_object(Privileges::SELECT), &n(DBA_ROLE), false, &mut sink)
        .unwrap_err();
    assert_eq!(err.code_str(), "X_28000");

    let create_stmts = sql_authz::get_sql_array(&m);
    assert!(!create_stmts.iter().any(|s| s.contains("EXT")));
}

#[test]
fn local_user_and_initial_schema_ddl_statements_are_emitted() {
    let m = fresh_manager();
    m.add_user(n("alice")).unwrap();
    m.set_password(&n("alice"), "s3cret", false).unwrap();
    m.set_local_only(&n("alice"), true).unwrap();
    m.set_initial_schema(&n("alice"), Some(n("analytics"))).unwrap();

    let alice = m.get(&n("alice")).unwrap();
    assert_eq!(alice.get_local_user_sql().as_deref(), Some("ALTER USER alice SET LOCAL TRUE"));
    assert_eq!(alice.get_initial_schema_sql().as_deref(), Some("ALTER USER alice SET INITIAL SCHEMA analytics"));

    let stmts = sql_authz::get_sql_array(&m);
    assert!(stmts.iter().any(|s| s == "ALTER USER alice SET LOCAL TRUE"));
}
