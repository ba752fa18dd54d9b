//! Resolution of the per-task `COMM_WORLD` sizes and of the universe size.
use mpispawn_model::{ModelError, WorldSize};
use tracing::{debug, instrument};

use crate::error::CoreError;
use crate::segment::{ParsedPrimary, ParsedSubsequent};

/// Universe fallback consulted when the invoking group has a single process.
pub const UNIVERSE_ENV: &str = "MPIEXEC_UNIVERSE_SIZE";

/// Everything the universe size may come from, in order of precedence.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniverseSources<'a> {
    /// `-nU` on the command line.
    pub explicit: Option<usize>,
    /// Size of the group this invocation runs in.
    pub ambient: usize,
    /// Raw value of [`UNIVERSE_ENV`], if set.
    pub env: Option<&'a str>,
}

/// Output of the size resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub sizes: Vec<usize>,
    pub universe_size: usize,
}

pub fn parse_world_size(raw: &str) -> Result<WorldSize, CoreError> {
    raw.parse::<WorldSize>()
        .map_err(|e: ModelError| CoreError::InvalidValue {
            arg: "-nW",
            value: raw.to_string(),
            expected: match e {
                ModelError::ZeroWorldSize => "a positive int",
                _ => "an int or tuple of ints",
            },
        })
}

pub fn resolve_universe(src: &UniverseSources<'_>) -> Result<usize, CoreError> {
    if let Some(n) = src.explicit {
        return Ok(n);
    }
    if src.ambient != 1 {
        return Ok(src.ambient);
    }

    let raw = src.env.ok_or(CoreError::UniverseUnknown)?;
    raw.trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| CoreError::InvalidEnvironment {
            var: UNIVERSE_ENV,
            value: raw.to_string(),
        })
}

/// Final list of group sizes.
///
/// `subsequent` holds the optional `-nW` of every segment after the first one, in order.
pub fn resolve_sizes(
    world: &WorldSize,
    universe: usize,
    subsequent: &[Option<usize>],
) -> Result<Vec<usize>, CoreError> {
    let sizes = match world {
        WorldSize::Tuple(sizes) => {
            if subsequent.iter().any(Option::is_some) {
                return Err(CoreError::TupleAndPerCommand);
            }
            sizes.clone()
        }
        WorldSize::Single(n) => {
            let given = subsequent.iter().filter(|s| s.is_some()).count();
            if !subsequent.is_empty() && given == subsequent.len() {
                std::iter::once(*n)
                    .chain(subsequent.iter().flatten().copied())
                    .collect()
            } else if given > 0 {
                return Err(CoreError::PartialPerCommand);
            } else {
                // Remainder of the division stays unused.
                vec![*n; universe / n]
            }
        }
    };

    let total: usize = sizes.iter().sum();
    if total > universe {
        return Err(CoreError::UniverseExceeded { total, universe });
    }
    Ok(sizes)
}

#[instrument(
    level = "debug",
    skip_all,
    fields(world = %primary.world_size, segments = subsequent.len() + 1)
)]
pub fn resolve(
    primary: &ParsedPrimary,
    subsequent: &[ParsedSubsequent],
    ambient: usize,
    env_universe: Option<&str>,
) -> Result<Resolution, CoreError> {
    let world = parse_world_size(&primary.world_size)?;
    let universe_size = resolve_universe(&UniverseSources {
        explicit: primary.universe_size,
        ambient,
        env: env_universe,
    })?;

    let per_command: Vec<Option<usize>> = subsequent.iter().map(|s| s.world_size).collect();
    let sizes = resolve_sizes(&world, universe_size, &per_command)?;

    debug!(
        target: "mpispawn.core.resolve",
        ?sizes,
        universe_size,
        tuple = world.is_tuple(),
        "world sizes resolved"
    );
    Ok(Resolution {
        sizes,
        universe_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpispawn_model::LaunchFlags;

    fn primary(world: &str, universe: Option<usize>) -> ParsedPrimary {
        ParsedPrimary {
            universe_size: universe,
            world_size: world.to_string(),
            command: vec!["prog".into()],
            leftover: vec![],
            flags: LaunchFlags::default(),
        }
    }

    fn sub(world: Option<usize>) -> ParsedSubsequent {
        ParsedSubsequent {
            world_size: world,
            command: vec!["other".into()],
            leftover: vec![],
        }
    }

    #[test]
    fn single_size_fills_universe() {
        for (w, u) in [(1, 1), (2, 8), (3, 8), (4, 8), (5, 4), (7, 100)] {
            let sizes = resolve_sizes(&WorldSize::Single(w), u, &[]).unwrap();
            assert_eq!(sizes.len(), u / w, "w={w} u={u}");
            assert!(sizes.iter().all(|s| *s == w));
            assert!(sizes.iter().sum::<usize>() <= u);
        }
    }

    #[test]
    fn tuple_is_taken_verbatim() {
        let sizes =
            resolve_sizes(&WorldSize::Tuple(vec![1, 2, 3, 4]), 10, &[None, None, None]).unwrap();
        assert_eq!(sizes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn tuple_conflicts_with_per_command_size() {
        let err = resolve_sizes(&WorldSize::Tuple(vec![1, 2]), 10, &[Some(2)]).unwrap_err();
        assert!(matches!(err, CoreError::TupleAndPerCommand));
    }

    #[test]
    fn per_command_sizes_follow_primary() {
        let sizes = resolve_sizes(&WorldSize::Single(1), 9, &[Some(2), Some(3), Some(3)]).unwrap();
        assert_eq!(sizes, vec![1, 2, 3, 3]);
    }

    #[test]
    fn partial_per_command_sizes_are_rejected() {
        let err = resolve_sizes(&WorldSize::Single(1), 9, &[Some(2), None]).unwrap_err();
        assert!(matches!(err, CoreError::PartialPerCommand));
    }

    #[test]
    fn no_per_command_sizes_fall_back_to_division() {
        let sizes = resolve_sizes(&WorldSize::Single(2), 5, &[None]).unwrap();
        assert_eq!(sizes, vec![2, 2]);
    }

    #[test]
    fn sum_exceeding_universe_is_rejected() {
        let err = resolve_sizes(&WorldSize::Tuple(vec![1, 2, 3, 4]), 8, &[]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::UniverseExceeded {
                total: 10,
                universe: 8
            }
        ));
    }

    #[test]
    fn universe_precedence() {
        let explicit = UniverseSources {
            explicit: Some(4),
            ambient: 8,
            env: Some("16"),
        };
        assert_eq!(resolve_universe(&explicit).unwrap(), 4);

        let ambient = UniverseSources {
            explicit: None,
            ambient: 8,
            env: Some("16"),
        };
        assert_eq!(resolve_universe(&ambient).unwrap(), 8);

        let env = UniverseSources {
            explicit: None,
            ambient: 1,
            env: Some("16"),
        };
        assert_eq!(resolve_universe(&env).unwrap(), 16);
    }

    #[test]
    fn universe_unknown_without_any_source() {
        let src = UniverseSources {
            explicit: None,
            ambient: 1,
            env: None,
        };
        let err = resolve_universe(&src).unwrap_err();
        assert_eq!(err.to_string(), "MPI Universe size is 1");
    }

    #[test]
    fn malformed_env_universe_is_reported() {
        let src = UniverseSources {
            explicit: None,
            ambient: 1,
            env: Some("lots"),
        };
        let err = resolve_universe(&src).unwrap_err();
        assert!(matches!(err, CoreError::InvalidEnvironment { var: UNIVERSE_ENV, ref value } if value == "lots"));
    }

    #[test]
    fn universe_error_precedes_consistency_checks() {
        let err = resolve(&primary("2", None), &[sub(Some(3))], 1, None).unwrap_err();
        assert!(matches!(err, CoreError::UniverseUnknown));
    }

    #[test]
    fn invalid_world_size_names_value() {
        let err = resolve(&primary("2;3", Some(8)), &[], 1, None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "argument -nW: invalid value '2;3' is not an int or tuple of ints"
        );
    }

    #[test]
    fn resolve_records_universe() {
        let res = resolve(&primary("4", Some(8)), &[], 1, None).unwrap();
        assert_eq!(
            res,
            Resolution {
                sizes: vec![4, 4],
                universe_size: 8
            }
        );
    }
}
