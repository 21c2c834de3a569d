use framelink_channel::{catalog, CatalogEntry, Direction};
use framelink_schema::SchemaRegistry;

use crate::cmd::{CatalogArgs, DirectionFilter};
use crate::exit::{schema_error, CliResult, SUCCESS};
use crate::output::{print_catalog, OutputFormat};

pub fn run(args: CatalogArgs, format: OutputFormat) -> CliResult<i32> {
    let registry = SchemaRegistry::builtin().map_err(|err| schema_error("built-in schemas", err))?;
    let entries = filter(catalog(), args.direction);
    print_catalog(&entries, |name| registry.has_schema(name), format);
    Ok(SUCCESS)
}

fn filter(entries: &[CatalogEntry], direction: Option<DirectionFilter>) -> Vec<CatalogEntry> {
    let wanted = direction.map(|filter| match filter {
        DirectionFilter::GuestToHost => Direction::GuestToHost,
        DirectionFilter::HostToGuest => Direction::HostToGuest,
    });
    entries
        .iter()
        .filter(|entry| wanted.map_or(true, |direction| entry.direction == direction))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_by_direction() {
        let inbound = filter(catalog(), Some(DirectionFilter::GuestToHost));
        assert!(inbound.iter().all(|entry| entry.direction == Direction::GuestToHost));
        assert!(inbound.iter().any(|entry| entry.name == "peer.connect"));

        let all = filter(catalog(), None);
        assert_eq!(all.len(), catalog().len());
    }
}
