//! Property tests for skolem resolution
//!
//! Minted identifiers must never reuse one that is live or retired, however
//! many of the minter's first choices are already taken.

use periodo_core::identifier::{self, authority_of};
use periodo_core::{EntityKind, IdMinter, JsonPointer, Patch, ValidationMode};
use periodo_engine::SkolemResolver;
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

fn sk(name: &str) -> String {
    format!("http://localhost/.well-known/genid/{}", name)
}

/// Patch adding `authorities` new authorities with `periods` new periods each
fn new_entities(authorities: usize, periods: usize) -> Patch {
    let ops: Vec<Value> = (0..authorities)
        .map(|a| {
            let authority = sk(&format!("a{}", a));
            let mut members = Map::new();
            for p in 0..periods {
                let period = sk(&format!("a{}p{}", a, p));
                members.insert(period.clone(), json!({"id": period, "label": "Period"}));
            }
            json!({
                "op": "add",
                "path": JsonPointer::from_tokens(["authorities", authority.as_str()]).to_string(),
                "value": {"id": authority, "periods": members}
            })
        })
        .collect();
    Patch::from_value(Value::Array(ops)).unwrap()
}

proptest! {
    #[test]
    fn minted_identifiers_avoid_taken_ones(
        seed in any::<u64>(),
        live in 0usize..5,
        retired_count in 0usize..5,
        authorities in 1usize..4,
        periods in 0usize..4,
    ) {
        // The minter's first picks are exactly the taken identifiers
        let mut shadow = IdMinter::seeded(seed);
        let taken: Vec<String> = (0..live + retired_count).map(|_| shadow.mint_authority()).collect();
        let in_use: BTreeSet<String> = taken[..live].iter().cloned().collect();
        let retired: BTreeSet<String> = taken[live..].iter().cloned().collect();

        let mut minter = IdMinter::seeded(seed);
        let mut resolver = SkolemResolver::new(&retired, &mut minter, 20);
        let out = resolver
            .resolve_patch(&new_entities(authorities, periods), in_use.clone())
            .unwrap();

        prop_assert_eq!(out.created.len(), authorities * (1 + periods));
        prop_assert_eq!(out.identifier_map.len(), out.created.len());
        for id in &out.created {
            prop_assert!(!in_use.contains(id));
            prop_assert!(!retired.contains(id));
            prop_assert!(identifier::validate(id, ValidationMode::Strict).is_ok());
        }
        prop_assert!(out.in_use.is_superset(&in_use));
        prop_assert!(out.in_use.is_superset(&out.created));

        // Every minted period nests under its own minted authority
        for a in 0..authorities {
            let authority = &out.identifier_map[&sk(&format!("a{}", a))];
            for p in 0..periods {
                let period = &out.identifier_map[&sk(&format!("a{}p{}", a, p))];
                prop_assert_eq!(
                    identifier::validate(period, ValidationMode::Strict),
                    Ok(EntityKind::Period)
                );
                prop_assert_eq!(authority_of(period), Some(authority.as_str()));
            }
        }
    }

    #[test]
    fn resolved_patch_carries_no_skolems(
        seed in any::<u64>(),
        authorities in 1usize..4,
        periods in 0usize..3,
    ) {
        let retired = BTreeSet::new();
        let mut minter = IdMinter::seeded(seed);
        let mut resolver = SkolemResolver::new(&retired, &mut minter, 10);
        let out = resolver
            .resolve_patch(&new_entities(authorities, periods), BTreeSet::new())
            .unwrap();
        prop_assert!(!out.resolved.to_json_string().contains("/.well-known/genid/"));
        prop_assert_eq!(out.resolved.len(), authorities);
    }
}
