//! Skolem reference resolution
//!
//! Submitted data names entities that do not have permanent identifiers yet
//! with skolem URIs (`https://example.org/.well-known/genid/<token>`). At merge
//! time every such URI is replaced by a minted identifier.
//!
//! Resolution runs in two passes over the input:
//!
//! 1. **Assign.** Walk the entity-insertion sites in document order and give
//!    each new authority or period an identifier, minted or pre-assigned.
//!    Every assignment goes straight into the in-use set, so no two entities
//!    in one submission can share an identifier.
//! 2. **Rewrite.** Build a new patch (or document) in which every skolem
//!    string, object key and path token is replaced through the assignment
//!    map. A skolem that pass 1 never assigned is an error.
//!
//! Insertion sites are `add`/`replace` operations whose path is one of
//!
//! ```text
//! ""                                  whole document
//! /authorities                        all authorities
//! /authorities/<a>                    one authority
//! /authorities/<a>/periods            all periods of <a>
//! /authorities/<a>/periods/<p>        one period
//! ```

use periodo_core::dataset::{AUTHORITIES, PERIODS};
use periodo_core::identifier::{self, EntityKind};
use periodo_core::{IdMinter, IdentifierError, JsonPointer, Patch, PatchOp, ValidationMode};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Marker every skolem URI contains
pub const SKOLEM_MARKER: &str = "/.well-known/genid/";

/// Token prefix of a skolem URI that carries its permanent identifier
pub const ASSIGNED_PREFIX: &str = "assigned/";

/// Whether `s` is a skolem URI
pub fn is_skolem(s: &str) -> bool {
    s.contains(SKOLEM_MARKER)
}

/// Permanent identifier carried by a skolem URI, if any
///
/// `https://example.org/.well-known/genid/assigned/p0bcdfx` carries `p0bcdfx`.
pub fn preassigned_id(skolem: &str) -> Option<&str> {
    let (_, token) = skolem.split_once(SKOLEM_MARKER)?;
    token.strip_prefix(ASSIGNED_PREFIX).filter(|id| !id.is_empty())
}

/// Outcome of a resolution pass
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<T> {
    /// Input with every skolem replaced
    pub resolved: T,
    /// Skolem URI to permanent identifier
    pub identifier_map: BTreeMap<String, String>,
    /// Identifiers assigned to new entities in this pass
    pub created: BTreeSet<String>,
    /// The in-use set handed in, plus every identifier assigned here
    pub in_use: BTreeSet<String>,
}

/// Resolves skolem references against the identifier registries
///
/// The resolver borrows the retired set and the minter; the in-use set is
/// passed in by value and handed back in the [`Resolution`].
pub struct SkolemResolver<'a> {
    retired: &'a BTreeSet<String>,
    minter: &'a mut IdMinter,
    max_attempts: usize,
}

impl<'a> SkolemResolver<'a> {
    /// Resolver that never reissues anything in `retired`
    pub fn new(retired: &'a BTreeSet<String>, minter: &'a mut IdMinter, max_attempts: usize) -> Self {
        SkolemResolver {
            retired,
            minter,
            max_attempts,
        }
    }

    /// Resolve every skolem reference in a patch
    ///
    /// # Errors
    ///
    /// `IdentifierError` for a colliding pre-assigned identifier, exhausted
    /// mint attempts, or a skolem outside every insertion site.
    pub fn resolve_patch(
        &mut self,
        patch: &Patch,
        in_use: BTreeSet<String>,
    ) -> Result<Resolution<Patch>, IdentifierError> {
        let mut pass = Assignments::new(in_use);
        for op in patch.ops() {
            if let Some(value) = op.value() {
                self.assign_at(&mut pass, op.path(), value)?;
            }
        }

        let resolved = patch
            .ops()
            .iter()
            .map(|op| rewrite_op(op, &pass.map))
            .collect::<Result<Patch, _>>()?;
        Ok(pass.finish(resolved))
    }

    /// Resolve every skolem reference in a whole dataset document
    ///
    /// Used for the initial load, where pre-assigned identifiers are common.
    pub fn resolve_document(
        &mut self,
        document: &Value,
        in_use: BTreeSet<String>,
    ) -> Result<Resolution<Value>, IdentifierError> {
        let mut pass = Assignments::new(in_use);
        self.assign_at(&mut pass, &JsonPointer::root(), document)?;
        let resolved = rewrite_value(document, &pass.map)?;
        Ok(pass.finish(resolved))
    }

    // =========================================================================
    // Pass 1: assignment
    // =========================================================================

    fn assign_at(
        &mut self,
        pass: &mut Assignments,
        path: &JsonPointer,
        value: &Value,
    ) -> Result<(), IdentifierError> {
        let tokens: Vec<&str> = path.tokens().iter().map(String::as_str).collect();
        match tokens.as_slice() {
            [] => {
                if let Some(authorities) = value.get(AUTHORITIES) {
                    self.assign_authorities(pass, authorities)?;
                }
            }
            [AUTHORITIES] => self.assign_authorities(pass, value)?,
            [AUTHORITIES, key] => self.assign_authority(pass, key, value)?,
            [AUTHORITIES, authority, PERIODS] => {
                let authority = pass.permanent(authority)?;
                self.assign_periods(pass, &authority, value)?;
            }
            [AUTHORITIES, authority, PERIODS, key] => {
                let authority = pass.permanent(authority)?;
                self.assign_period(pass, &authority, key, value)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn assign_authorities(
        &mut self,
        pass: &mut Assignments,
        authorities: &Value,
    ) -> Result<(), IdentifierError> {
        if let Some(map) = authorities.as_object() {
            for (key, authority) in map {
                self.assign_authority(pass, key, authority)?;
            }
        }
        Ok(())
    }

    fn assign_authority(
        &mut self,
        pass: &mut Assignments,
        key: &str,
        authority: &Value,
    ) -> Result<(), IdentifierError> {
        let id = match declared_skolems(key, authority) {
            Some((skolem, alias)) => {
                let id = self.assign(pass, skolem, EntityKind::Authority, None)?;
                if let Some(alias) = alias {
                    pass.alias(alias, &id);
                }
                id
            }
            None => key.to_string(),
        };
        if let Some(periods) = authority.get(PERIODS) {
            self.assign_periods(pass, &id, periods)?;
        }
        Ok(())
    }

    fn assign_periods(
        &mut self,
        pass: &mut Assignments,
        authority: &str,
        periods: &Value,
    ) -> Result<(), IdentifierError> {
        if let Some(map) = periods.as_object() {
            for (key, period) in map {
                self.assign_period(pass, authority, key, period)?;
            }
        }
        Ok(())
    }

    fn assign_period(
        &mut self,
        pass: &mut Assignments,
        authority: &str,
        key: &str,
        period: &Value,
    ) -> Result<(), IdentifierError> {
        if let Some((skolem, alias)) = declared_skolems(key, period) {
            let id = self.assign(pass, skolem, EntityKind::Period, Some(authority))?;
            if let Some(alias) = alias {
                pass.alias(alias, &id);
            }
        }
        Ok(())
    }

    fn assign(
        &mut self,
        pass: &mut Assignments,
        skolem: &str,
        kind: EntityKind,
        authority: Option<&str>,
    ) -> Result<String, IdentifierError> {
        if let Some(existing) = pass.map.get(skolem) {
            return Ok(existing.clone());
        }

        let id = match preassigned_id(skolem) {
            Some(id) => self.accept_preassigned(pass, id, kind, authority)?,
            None => self.mint_unused(pass, authority)?,
        };
        tracing::debug!(skolem, id = %id, ?kind, "Assigned identifier");
        pass.record(skolem, &id);
        Ok(id)
    }

    fn accept_preassigned(
        &self,
        pass: &Assignments,
        id: &str,
        kind: EntityKind,
        authority: Option<&str>,
    ) -> Result<String, IdentifierError> {
        let actual = identifier::validate(id, ValidationMode::Strict)?;
        if actual != kind {
            return Err(IdentifierError::Malformed {
                id: id.to_string(),
                reason: format!("expected a {:?} identifier, found a {:?} identifier", kind, actual),
            });
        }
        if let Some(authority) = authority {
            if identifier::authority_of(id) != Some(authority) {
                return Err(IdentifierError::Malformed {
                    id: id.to_string(),
                    reason: format!("period is not nested under authority '{}'", authority),
                });
            }
        }
        if pass.in_use.contains(id) || self.retired.contains(id) {
            return Err(IdentifierError::Collision(id.to_string()));
        }
        Ok(id.to_string())
    }

    fn mint_unused(
        &mut self,
        pass: &Assignments,
        authority: Option<&str>,
    ) -> Result<String, IdentifierError> {
        for attempt in 0..self.max_attempts {
            let candidate = match authority {
                Some(authority) => self.minter.mint_period(authority)?,
                None => self.minter.mint_authority(),
            };
            if !pass.in_use.contains(&candidate) && !self.retired.contains(&candidate) {
                return Ok(candidate);
            }
            tracing::debug!(attempt, candidate = %candidate, "Minted identifier already issued");
        }
        Err(IdentifierError::TooManyCollisions(self.max_attempts))
    }
}

/// The skolem an entity is declared with, plus a second spelling if the
/// object key and the `id` member are different skolems
fn declared_skolems<'v>(key: &'v str, entity: &'v Value) -> Option<(&'v str, Option<&'v str>)> {
    let member = entity.get("id").and_then(Value::as_str).filter(|s| is_skolem(s));
    let key = Some(key).filter(|k| is_skolem(k));
    match (member, key) {
        (Some(member), Some(key)) if member != key => Some((member, Some(key))),
        (Some(member), _) => Some((member, None)),
        (None, Some(key)) => Some((key, None)),
        (None, None) => None,
    }
}

/// Assignment state threaded through pass 1
struct Assignments {
    map: BTreeMap<String, String>,
    created: BTreeSet<String>,
    in_use: BTreeSet<String>,
}

impl Assignments {
    fn new(in_use: BTreeSet<String>) -> Self {
        Assignments {
            map: BTreeMap::new(),
            created: BTreeSet::new(),
            in_use,
        }
    }

    fn record(&mut self, skolem: &str, id: &str) {
        self.map.insert(skolem.to_string(), id.to_string());
        self.created.insert(id.to_string());
        self.in_use.insert(id.to_string());
    }

    fn alias(&mut self, skolem: &str, id: &str) {
        self.map
            .entry(skolem.to_string())
            .or_insert_with(|| id.to_string());
    }

    /// Permanent id for a path token naming an existing or new authority
    fn permanent(&self, token: &str) -> Result<String, IdentifierError> {
        if !is_skolem(token) {
            return Ok(token.to_string());
        }
        self.map
            .get(token)
            .cloned()
            .ok_or_else(|| IdentifierError::UnrecognizedSkolem {
                uri: token.to_string(),
            })
    }

    fn finish<T>(self, resolved: T) -> Resolution<T> {
        Resolution {
            resolved,
            identifier_map: self.map,
            created: self.created,
            in_use: self.in_use,
        }
    }
}

// =============================================================================
// Pass 2: rewrite
// =============================================================================

fn rewrite_str(s: &str, map: &BTreeMap<String, String>) -> Result<String, IdentifierError> {
    if !is_skolem(s) {
        return Ok(s.to_string());
    }
    map.get(s)
        .cloned()
        .ok_or_else(|| IdentifierError::UnrecognizedSkolem { uri: s.to_string() })
}

fn rewrite_value(value: &Value, map: &BTreeMap<String, String>) -> Result<Value, IdentifierError> {
    Ok(match value {
        Value::String(s) => Value::String(rewrite_str(s, map)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| rewrite_value(item, map))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(members) => {
            let mut out = Map::with_capacity(members.len());
            for (key, member) in members {
                out.insert(rewrite_str(key, map)?, rewrite_value(member, map)?);
            }
            Value::Object(out)
        }
        other => other.clone(),
    })
}

fn rewrite_path(path: &JsonPointer, map: &BTreeMap<String, String>) -> Result<JsonPointer, IdentifierError> {
    let mut failed = None;
    let rewritten = path.map_tokens(|token| match rewrite_str(token, map) {
        Ok(token) => token,
        Err(e) => {
            failed.get_or_insert(e);
            token.to_string()
        }
    });
    match failed {
        Some(e) => Err(e),
        None => Ok(rewritten),
    }
}

fn rewrite_op(op: &PatchOp, map: &BTreeMap<String, String>) -> Result<PatchOp, IdentifierError> {
    Ok(match op {
        PatchOp::Add { path, value } => PatchOp::Add {
            path: rewrite_path(path, map)?,
            value: rewrite_value(value, map)?,
        },
        PatchOp::Remove { path } => PatchOp::Remove {
            path: rewrite_path(path, map)?,
        },
        PatchOp::Replace { path, value } => PatchOp::Replace {
            path: rewrite_path(path, map)?,
            value: rewrite_value(value, map)?,
        },
    })
}
