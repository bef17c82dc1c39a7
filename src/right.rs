//! `Right`: a bundle of per-object privileges, optional column subsets and
//! an optional row-filter bit. Mirrors the bitset-plus-column-map shape
//! `spec.md` §3/§4.1 describes.

use crate::error::AuthError;
use bitflags::bitflags;
use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Privileges: u16 {
        const SELECT     = 1 << 0;
        const INSERT     = 1 << 1;
        const UPDATE     = 1 << 2;
        const DELETE     = 1 << 3;
        const REFERENCES = 1 << 4;
        const TRIGGER    = 1 << 5;
        const EXECUTE    = 1 << 6;
        const USAGE      = 1 << 7;
    }
}

impl Privileges {
    pub const ALL: Privileges = Privileges::from_bits_truncate(
        Privileges::SELECT.bits()
            | Privileges::INSERT.bits()
            | Privileges::UPDATE.bits()
            | Privileges::DELETE.bits()
            | Privileges::REFERENCES.bits()
            | Privileges::TRIGGER.bits()
            | Privileges::EXECUTE.bits()
            | Privileges::USAGE.bits(),
    );

    /// Privileges that may carry a column-level subset.
    pub const COLUMN_AWARE: Privileges = Privileges::from_bits_truncate(
        Privileges::SELECT.bits()
            | Privileges::INSERT.bits()
            | Privileges::UPDATE.bits()
            | Privileges::REFERENCES.bits(),
    );

    pub fn single_bits(self) -> impl Iterator<Item = Privileges> {
        self.iter()
    }
}

/// A column projection for a single column-aware privilege: either the
/// whole object, or an explicit set of column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnSet {
    Whole,
    Columns(IndexSet<String>),
}

impl Default for ColumnSet {
    fn default() -> Self {
        ColumnSet::Whole
    }
}

impl ColumnSet {
    fn union(&self, other: &ColumnSet) -> ColumnSet {
        match (self, other) {
            (ColumnSet::Whole, _) | (_, ColumnSet::Whole) => ColumnSet::Whole,
            (ColumnSet::Columns(a), ColumnSet::Columns(b)) => {
                let mut merged = a.clone();
                merged.extend(b.iter().cloned());
                ColumnSet::Columns(merged)
            }
        }
    }

    /// Remove `other`'s columns from `self`; `None` means the privilege is
    /// now fully removed (empty column set).
    fn subtract(&self, other: &ColumnSet) -> Option<ColumnSet> {
        match (self, other) {
            (_, ColumnSet::Whole) => None,
            (ColumnSet::Whole, ColumnSet::Columns(_)) => Some(ColumnSet::Whole),
            (ColumnSet::Columns(a), ColumnSet::Columns(b)) => {
                let remaining: IndexSet<String> = a.iter().filter(|c| !b.contains(*c)).cloned().collect();
                if remaining.is_empty() {
                    None
                } else {
                    Some(ColumnSet::Columns(remaining))
                }
            }
        }
    }

    /// True iff `self` (the held set) covers `other` (the requested set).
    fn contains(&self, other: &ColumnSet) -> bool {
        match (self, other) {
            (ColumnSet::Whole, _) => true,
            (ColumnSet::Columns(_), ColumnSet::Whole) => false,
            (ColumnSet::Columns(a), ColumnSet::Columns(b)) => b.iter().all(|c| a.contains(c)),
        }
    }

    /// True iff this set does not fully cover the whole object — i.e. it is
    /// an explicit column list, not `Whole`.
    fn is_partial(&self) -> bool {
        matches!(self, ColumnSet::Columns(_))
    }
}

/// A privilege bundle on one object: which privilege bits are held, the
/// column projection for the column-aware ones, and an optional row filter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Right {
    priv_bits: Privileges,
    column_sets: IndexMap<Privileges, ColumnSet>,
    has_filter: bool,
}

impl Right {
    pub fn empty() -> Self {
        Right::default()
    }

    pub fn whole_object(privs: Privileges) -> Self {
        let mut r = Right { priv_bits: privs, column_sets: IndexMap::new(), has_filter: false };
        for p in privs.single_bits() {
            if Privileges::COLUMN_AWARE.contains(p) {
                r.column_sets.insert(p, ColumnSet::Whole);
            }
        }
        r
    }

    pub fn with_columns(priv_bit: Privileges, columns: IndexSet<String>) -> Self {
        let mut column_sets = IndexMap::new();
        column_sets.insert(priv_bit, ColumnSet::Columns(columns));
        Right { priv_bits: priv_bit, column_sets, has_filter: false }
    }

    pub fn with_filter(mut self) -> Self {
        self.has_filter = true;
        self
    }

    pub fn priv_bits(&self) -> Privileges {
        self.priv_bits
    }

    pub fn has_filter(&self) -> bool {
        self.has_filter
    }

    pub fn is_empty(&self) -> bool {
        self.priv_bits.is_empty() && !self.has_filter
    }

    pub fn has(&self, p: Privileges) -> bool {
        self.priv_bits.contains(p)
    }

    /// Bitwise union of `priv_bits` and per-privilege union of `column_sets`.
    pub fn add(&self, other: &Right) -> Right {
        let priv_bits = self.priv_bits | other.priv_bits;
        let mut column_sets = self.column_sets.clone();
        for p in other.priv_bits.single_bits() {
            if !Privileges::COLUMN_AWARE.contains(p) {
                continue;
            }
            let incoming = other.column_sets.get(&p).cloned().unwrap_or(ColumnSet::Whole);
            let merged = match column_sets.get(&p) {
                Some(existing) => existing.union(&incoming),
                None => incoming,
            };
            column_sets.insert(p, merged);
        }
        Right { priv_bits, column_sets, has_filter: self.has_filter || other.has_filter }
    }

    /// Bitwise subtract. `cascade = false` rejects removing a column subset
    /// the holder does not fully have.
    pub fn remove(&self, other: &Right, cascade: bool, object_name: &str) -> Result<Right, AuthError> {
        let mut priv_bits = self.priv_bits;
        let mut column_sets = self.column_sets.clone();
        for p in other.priv_bits.single_bits() {
            if !Privileges::COLUMN_AWARE.contains(p) {
                priv_bits.remove(p);
                continue;
            }
            let held = column_sets.get(&p).cloned();
            let requested = other.column_sets.get(&p).cloned().unwrap_or(ColumnSet::Whole);
            match held {
                None => {
                    if !cascade && requested.is_partial() {
                        return Err(AuthError::not_authorized_object(object_name));
                    }
                }
                Some(held_set) => {
                    if !cascade && requested.is_partial() && !held_set.contains(&requested) {
                        return Err(AuthError::not_authorized_object(object_name));
                    }
                    match held_set.subtract(&requested) {
                        None => {
                            priv_bits.remove(p);
                            column_sets.shift_remove(&p);
                        }
                        Some(remaining) => {
                            column_sets.insert(p, remaining);
                        }
                    }
                }
            }
        }
        let has_filter = self.has_filter && !other.has_filter;
        Ok(Right { priv_bits, column_sets, has_filter })
    }

    /// True iff `self` (the held right) covers everything `other` requests.
    pub fn contains(&self, other: &Right) -> bool {
        if !self.priv_bits.contains(other.priv_bits) {
            return false;
        }
        for p in other.priv_bits.single_bits() {
            if !Privileges::COLUMN_AWARE.contains(p) {
                continue;
            }
            let held = self.column_sets.get(&p).cloned().unwrap_or(ColumnSet::Whole);
            let requested = other.column_sets.get(&p).cloned().unwrap_or(ColumnSet::Whole);
            if !held.contains(&requested) {
                return false;
            }
        }
        true
    }

    pub fn column_set(&self, p: Privileges) -> Option<&ColumnSet> {
        self.column_sets.get(&p)
    }
}

static KEYWORD_TABLE: Lazy<IndexMap<&'static str, Privileges>> = Lazy::new(|| {
    let mut m = IndexMap::new();
    m.insert("SELECT", Privileges::SELECT);
    m.insert("INSERT", Privileges::INSERT);
    m.insert("UPDATE", Privileges::UPDATE);
    m.insert("DELETE", Privileges::DELETE);
    m.insert("REFERENCES", Privileges::REFERENCES);
    m.insert("TRIGGER", Privileges::TRIGGER);
    m.insert("EXECUTE", Privileges::EXECUTE);
    m.insert("USAGE", Privileges::USAGE);
    m.insert("ALL", Privileges::ALL);
    m
});

/// `getRight(token)`: unknown tokens return an empty bitset.
pub fn lookup_privilege(token: &str) -> Privileges {
    KEYWORD_TABLE.get(token.to_ascii_uppercase().as_str()).copied().unwrap_or(Privileges::empty())
}

/// `getCheckSingleRight(token)`: unknown tokens fail X_42581 — modeled here
/// as `InvalidAuthSpec` since the taxonomy in this crate has no dedicated
/// variant for the parser-facing "unknown privilege keyword" case.
pub fn check_single_privilege(token: &str) -> Result<Privileges, AuthError> {
    let bits = lookup_privilege(token);
    if bits.is_empty() && !token.eq_ignore_ascii_case("ALL") {
        Err(AuthError::invalid_auth_spec(format!("unknown privilege keyword: {token}")))
    } else {
        Ok(bits)
    }
}

/// SQL-keyword name for a single privilege bit, for DDL serialization.
pub fn privilege_name(p: Privileges) -> &'static str {
    if p.contains(Privileges::SELECT) {
        "SELECT"
    } else if p.contains(Privileges::INSERT) {
        "INSERT"
    } else if p.contains(Privileges::UPDATE) {
        "UPDATE"
    } else if p.contains(Privileges::DELETE) {
        "DELETE"
    } else if p.contains(Privileges::REFERENCES) {
        "REFERENCES"
    } else if p.contains(Privileges::TRIGGER) {
        "TRIGGER"
    } else if p.contains(Privileges::EXECUTE) {
        "EXECUTE"
    } else if p.contains(Privileges::USAGE) {
        "USAGE"
    } else {
        "UNKNOWN"
    }
}
