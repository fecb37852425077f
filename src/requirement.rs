//! Requirement/composition expression parsing: turns a `"a, b, !c"` string
//! into `must_have`/`must_not_have` masks. Rust's `&str` is already
//! immutable, so the tokenizer borrows it directly instead of copying: strip
//! whitespace, split on commas, inspect the first byte for `!`.

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::mask::Mask;
use crate::registry::{TypeId, TypeRegistry};

/// A parsed system requirement: `must_have`/`must_not_have` masks plus the
/// ordered vector of positive-requirement type ids.
pub struct Requirement {
    pub must_have: Mask,
    pub must_not_have: Mask,
    pub types: SmallVec<[TypeId; 8]>,
}

/// Parses a system requirement string (`"a, b, !c, d"`): unprefixed tokens
/// contribute to `must_have` and are appended, in token order, to `types`;
/// `!`-prefixed tokens contribute to `must_not_have` only.
pub fn parse_requirement(registry: &TypeRegistry, expr: &str) -> Result<Requirement> {
    let width = registry.len();
    let mut must_have = Mask::with_width(width);
    let mut must_not_have = Mask::with_width(width);
    let mut types = SmallVec::new();

    for token in tokenize(expr) {
        if let Some(identifier) = token.strip_prefix('!') {
            let id = lookup(registry, identifier)?;
            must_not_have.incl(id);
        } else {
            let id = lookup(registry, token)?;
            must_have.incl(id);
            types.push(id);
        }
    }

    Ok(Requirement {
        must_have,
        must_not_have,
        types,
    })
}

/// Parses an entity composition string: the same grammar as a requirement
/// expression, but `!`-prefixed tokens are rejected, since composition
/// names only the components an entity is spawned with.
pub fn parse_composition(registry: &TypeRegistry, expr: &str) -> Result<Mask> {
    let mut mask = Mask::with_width(registry.len());

    for token in tokenize(expr) {
        if token.starts_with('!') {
            return Err(Error::BadRequirement(format!(
                "composition must not contain negated tokens: `{}`",
                token
            )));
        }
        mask.incl(lookup(registry, token)?);
    }

    Ok(mask)
}

fn lookup(registry: &TypeRegistry, identifier: &str) -> Result<TypeId> {
    registry
        .lookup_id(identifier)
        .ok_or_else(|| Error::BadRequirement(format!("unknown component `{}`", identifier)))
}

/// Copies the expression, strips whitespace, and splits on commas, dropping
/// empty tokens (a trailing comma or doubled comma yields no token rather
/// than an error).
fn tokenize(expr: &str) -> impl Iterator<Item = &str> {
    expr.split(',').map(str::trim).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        let mut reg = TypeRegistry::new();
        reg.register("a", 4, 4).unwrap();
        reg.register("b", 1, 1).unwrap();
        reg.register("c", 8, 8).unwrap();
        reg
    }

    #[test]
    fn requirement_splits_positive_and_negative_tokens() {
        let reg = registry();
        let req = parse_requirement(&reg, "a, !b, c").unwrap();

        let a = reg.lookup_id("a").unwrap();
        let b = reg.lookup_id("b").unwrap();
        let c = reg.lookup_id("c").unwrap();

        assert!(req.must_have.has(a));
        assert!(req.must_have.has(c));
        assert!(!req.must_have.has(b));
        assert!(req.must_not_have.has(b));
        assert_eq!(req.types.as_slice(), &[a, c]);
    }

    #[test]
    fn whitespace_around_tokens_is_stripped() {
        let reg = registry();
        let req = parse_requirement(&reg, "  a ,  !b  ").unwrap();
        assert_eq!(req.types.len(), 1);
    }

    #[test]
    fn unknown_identifier_is_bad_requirement() {
        let reg = registry();
        let err = parse_requirement(&reg, "a, nope").unwrap_err();
        assert!(matches!(err, Error::BadRequirement(_)));
    }

    #[test]
    fn composition_rejects_negated_tokens() {
        let reg = registry();
        let err = parse_composition(&reg, "a, !b").unwrap_err();
        assert!(matches!(err, Error::BadRequirement(_)));
    }

    #[test]
    fn composition_builds_mask_of_positive_tokens() {
        let reg = registry();
        let mask = parse_composition(&reg, "a, b, c").unwrap();
        assert_eq!(mask.count(), 3);
    }
}
