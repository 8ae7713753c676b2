use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::decl::Declaration;

/// Bytes taken from the owner-type digest.
pub(crate) const TYPE_HASH_SIZE: usize = 10;
/// Bytes taken from the member-name + descriptor digest.
pub(crate) const SIG_HASH_SIZE: usize = 4;
pub(crate) const HASH_SIZE: usize = TYPE_HASH_SIZE + SIG_HASH_SIZE;

/// Constraint placed on one parameter by a conditional direction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ParamConstraint {
    NotNull,
    Null,
    True,
    False,
}

impl ParamConstraint {
    fn code(self) -> u32 {
        match self {
            ParamConstraint::NotNull => 0,
            ParamConstraint::Null => 1,
            ParamConstraint::True => 2,
            ParamConstraint::False => 3,
        }
    }

    fn from_code(code: u32) -> ParamConstraint {
        match code {
            0 => ParamConstraint::NotNull,
            1 => ParamConstraint::Null,
            2 => ParamConstraint::True,
            _ => ParamConstraint::False,
        }
    }
}

/// Which fact about a declaration an equation describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Direction {
    /// Return value on normal completion.
    Out,
    /// Absence of observable side effects.
    Pure,
    /// Return value when the parameter satisfies the constraint on entry.
    In { param: u16, constraint: ParamConstraint },
    /// The method throws when the parameter satisfies the constraint on entry.
    InThrow { param: u16, constraint: ParamConstraint },
}

impl Direction {
    /// Compact integer form stored in hash keys. Out=0, Pure=1, then eight
    /// slots per parameter: four constraints times a throw bit.
    pub(crate) fn code(self) -> u32 {
        match self {
            Direction::Out => 0,
            Direction::Pure => 1,
            Direction::In { param, constraint } => 2 + 8 * u32::from(param) + 2 * constraint.code(),
            Direction::InThrow { param, constraint } => {
                2 + 8 * u32::from(param) + 2 * constraint.code() + 1
            }
        }
    }

    pub(crate) fn from_code(code: u32) -> Direction {
        match code {
            0 => Direction::Out,
            1 => Direction::Pure,
            _ => {
                let offset = code - 2;
                let param = (offset / 8) as u16;
                let slot = offset % 8;
                let constraint = ParamConstraint::from_code(slot / 2);
                if slot % 2 == 0 {
                    Direction::In { param, constraint }
                } else {
                    Direction::InThrow { param, constraint }
                }
            }
        }
    }

    /// Parameter index and constraint for conditional directions.
    pub(crate) fn param_constraint(self) -> Option<(u16, ParamConstraint)> {
        match self {
            Direction::In { param, constraint } | Direction::InThrow { param, constraint } => {
                Some((param, constraint))
            }
            Direction::Out | Direction::Pure => None,
        }
    }
}

/// Fully-qualified member reference in binary-name form.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize)]
pub(crate) struct MemberRef {
    /// Internal owner name, e.g. `com/acme/Outer$Inner`.
    pub(crate) owner: String,
    pub(crate) name: String,
    /// Erased JVM method descriptor, e.g. `(Ljava/lang/Object;)Z`.
    pub(crate) descriptor: String,
}

/// Declaration-identity key of one equation.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Deserialize)]
pub(crate) struct RawKey {
    pub(crate) member: MemberRef,
    pub(crate) direction: Direction,
    pub(crate) stable: bool,
    #[serde(default)]
    pub(crate) negated: bool,
}

/// Compact collision-resistant key: two truncated digest segments plus the
/// direction code and flag bits.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub(crate) struct HashKey {
    pub(crate) digest: [u8; HASH_SIZE],
    pub(crate) direction_code: u32,
    pub(crate) stable: bool,
    pub(crate) negated: bool,
}

impl HashKey {
    pub(crate) fn direction(self) -> Direction {
        Direction::from_code(self.direction_code)
    }

    pub(crate) fn with_direction(self, direction: Direction) -> HashKey {
        HashKey {
            direction_code: direction.code(),
            ..self
        }
    }

    pub(crate) fn stabilized(self) -> HashKey {
        HashKey {
            stable: true,
            ..self
        }
    }

    /// Bare declaration key: direction stripped back to `Out`, negation cleared.
    pub(crate) fn base(self) -> HashKey {
        HashKey {
            direction_code: Direction::Out.code(),
            negated: false,
            ..self
        }
    }

    /// Matching form used by the solvers: stabilized and unnegated.
    pub(crate) fn canonical(self) -> HashKey {
        HashKey {
            stable: true,
            negated: false,
            ..self
        }
    }
}

/// Reusable digest scratch. The hasher accumulates state across the two
/// segment computations, so each concurrent worker must own its own engine.
pub(crate) struct DigestEngine {
    hasher: Sha256,
}

impl DigestEngine {
    pub(crate) fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    /// Two-segment member digest: owner identity alone, then member name plus
    /// descriptor, truncated and concatenated. The segments are computed
    /// independently so distinct owners never alias across the signature part.
    pub(crate) fn member_digest(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> [u8; HASH_SIZE] {
        self.hasher.update(owner.as_bytes());
        let type_digest = self.hasher.finalize_reset();
        self.hasher.update(name.as_bytes());
        self.hasher.update(descriptor.as_bytes());
        let sig_digest = self.hasher.finalize_reset();

        let mut digest = [0u8; HASH_SIZE];
        digest[..TYPE_HASH_SIZE].copy_from_slice(&type_digest[..TYPE_HASH_SIZE]);
        digest[TYPE_HASH_SIZE..].copy_from_slice(&sig_digest[..SIG_HASH_SIZE]);
        digest
    }
}

/// Compact a declaration-identity key. Direction and flags carry over as-is.
pub(crate) fn hash_key(key: &RawKey, md: &mut DigestEngine) -> HashKey {
    let digest = md.member_digest(&key.member.owner, &key.member.name, &key.member.descriptor);
    HashKey {
        digest,
        direction_code: key.direction.code(),
        stable: key.stable,
        negated: key.negated,
    }
}

/// Compact key for a resolvable declaration. Declaration-sourced keys are
/// always stable; returns `None` when the identity cannot be rendered.
pub(crate) fn declaration_key(
    declaration: &Declaration,
    direction: Direction,
    md: &mut DigestEngine,
) -> Option<HashKey> {
    let identity = declaration.identity()?;
    let digest = md.member_digest(&identity.owner, &identity.member_name, &identity.descriptor);
    Some(HashKey {
        digest,
        direction_code: direction.code(),
        stable: true,
        negated: false,
    })
}
