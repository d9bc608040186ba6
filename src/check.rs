use anyhow::{bail, Result};
use identireg::identifier;
use identireg::{IdentityError, IdentityProvider, ResourceLocation};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Status {
    Found,
    NotFound,
    Invalid,
}

impl Status {
    fn token(self) -> &'static str {
        match self {
            Status::Found => "FOUND",
            Status::NotFound => "NOT_FOUND",
            Status::Invalid => "INVALID",
        }
    }
}

/// Identifier -> location, one input per line of output.
pub fn run_resolve(
    provider: &mut impl IdentityProvider,
    inputs: &[String],
    quiet: bool,
) -> Result<Vec<Status>> {
    if inputs.is_empty() {
        bail!("resolve requires at least one identifier");
    }

    let mut out = Vec::with_capacity(inputs.len());
    for input in inputs {
        let st = match provider.get_resource_location_for_identifier(input) {
            Ok(Some(location)) => {
                if !quiet {
                    println!("ID {input}");
                    println!("  RESULT FOUND {location}");
                }
                Status::Found
            }
            Ok(None) => {
                if !quiet {
                    println!("ID {input}");
                    println!("  RESULT NOT_FOUND (no identity-table entry)");
                }
                Status::NotFound
            }
            Err(IdentityError::InvalidIdentifier { reason, .. }) => {
                if !quiet {
                    println!("ID {input}");
                    println!("  RESULT INVALID ({reason})");
                }
                Status::Invalid
            }
            Err(e) => return Err(e.into()),
        };

        if quiet {
            println!("{} {input}", st.token());
        }
        out.push(st);
    }
    Ok(out)
}

/// Location -> identifier. Local ids that do not parse are reported as
/// INVALID without a lookup.
pub fn run_lookup(
    provider: &mut impl IdentityProvider,
    collection: &str,
    local_ids: &[String],
    quiet: bool,
) -> Result<Vec<Status>> {
    if local_ids.is_empty() {
        bail!("lookup requires at least one local id");
    }

    let mut out = Vec::with_capacity(local_ids.len());
    for raw in local_ids {
        let label = format!("{collection}:{}", raw.trim());
        let st = match ResourceLocation::parse_local_id(raw) {
            Err(e) => {
                if !quiet {
                    println!("LOCATION {label}");
                    println!("  RESULT INVALID ({e})");
                }
                Status::Invalid
            }
            Ok(local_id) => match provider.get_identifier_for_resource_location(collection, local_id) {
                Ok(Some(identifier)) => {
                    if !quiet {
                        println!("LOCATION {label}");
                        println!("  RESULT FOUND {identifier}");
                    }
                    Status::Found
                }
                Ok(None) => {
                    if !quiet {
                        println!("LOCATION {label}");
                        if provider.is_applicable(collection) {
                            println!("  RESULT NOT_FOUND");
                        } else {
                            println!("  RESULT NOT_FOUND (collection carries no identifiers)");
                        }
                    }
                    Status::NotFound
                }
                Err(IdentityError::InvalidIdentifier { value, reason }) => {
                    if !quiet {
                        println!("LOCATION {label}");
                        println!("  RESULT INVALID (record holds {value:?}: {reason})");
                    }
                    Status::Invalid
                }
                Err(e) => return Err(e.into()),
            },
        };

        if quiet {
            println!("{} {label}", st.token());
        }
        out.push(st);
    }
    Ok(out)
}

/// Print VALID / INVALID per input. Returns how many were invalid.
pub fn run_validate(inputs: &[String]) -> Result<usize> {
    if inputs.is_empty() {
        bail!("validate requires at least one identifier");
    }

    let mut invalid = 0;
    for input in inputs {
        match identifier::validate_identifier(input) {
            Ok(()) => println!("VALID {input}"),
            Err(IdentityError::InvalidIdentifier { reason, .. }) => {
                invalid += 1;
                println!("INVALID {input} ({reason})");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use identireg::config::ProviderConfig;
    use identireg::{MemoryStore, StaticCatalog, UuidProvider};

    const U1: &str = "123e4567-e89b-12d3-a456-426614174000";
    const U2: &str = "9b2f3c1e-7d4a-4c8b-9e0f-1a2b3c4d5e6f";

    fn provider(store: MemoryStore) -> UuidProvider<MemoryStore, StaticCatalog> {
        let catalog = StaticCatalog::new()
            .with_collection("pages", true)
            .with_collection("logs", false);
        UuidProvider::new("record_uuid", ProviderConfig::default(), store, catalog)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn resolve_reports_one_status_per_input() {
        let mut store = MemoryStore::new("uuid");
        store.put_record("pages", 1, U1);
        store.add_registry_row(U1, "pages", 1);
        let mut p = provider(store);

        for quiet in [true, false] {
            let st = run_resolve(&mut p, &strings(&[U1, U2, "not-a-uuid"]), quiet).unwrap();
            assert_eq!(st, vec![Status::Found, Status::NotFound, Status::Invalid]);
        }
    }

    #[test]
    fn quiet_tokens() {
        let tokens: Vec<_> = [Status::Found, Status::NotFound, Status::Invalid]
            .into_iter()
            .map(Status::token)
            .collect();
        assert_eq!(tokens, ["FOUND", "NOT_FOUND", "INVALID"]);
    }

    #[test]
    fn lookup_flags_unparsable_ids_and_bad_record_values() {
        let mut store = MemoryStore::new("uuid");
        store.put_record("pages", 3, U1);
        store.add_registry_row(U1, "pages", 3);
        store.put_record("pages", 4, "garbage");
        store.put_record("pages", 5, U2);
        let mut p = provider(store);

        let st = run_lookup(&mut p, "pages", &strings(&["3", "x", "9", " 4 ", "5"]), true).unwrap();
        assert_eq!(
            st,
            vec![
                Status::Found,
                Status::Invalid,
                Status::NotFound,
                Status::Invalid,
                Status::Found,
            ]
        );
        // Record 5 carried an unregistered identifier.
        assert!(p.queue().pending_insert(U2).is_some());

        let st = run_lookup(&mut p, "logs", &strings(&["1"]), false).unwrap();
        assert_eq!(st, vec![Status::NotFound]);
    }

    #[test]
    fn validate_counts_invalid_inputs() {
        assert_eq!(run_validate(&strings(&[U1, "", "not-a-uuid"])).unwrap(), 2);
        assert_eq!(run_validate(&strings(&[U1, U2])).unwrap(), 0);
    }

    #[test]
    fn empty_input_is_refused() {
        let mut p = provider(MemoryStore::new("uuid"));
        assert!(run_resolve(&mut p, &[], true).is_err());
        assert!(run_lookup(&mut p, "pages", &[], true).is_err());
        assert!(run_validate(&[]).is_err());
    }
}
