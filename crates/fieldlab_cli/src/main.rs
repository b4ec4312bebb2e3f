//! `fieldlab` command-line entry point.
//!
//! # Responsibility
//! - Resolve engine configuration from file, environment and flags.
//! - Drive the core services and print search envelopes as JSON.

mod args;

use args::{Cli, Commands};
use clap::Parser;
use fieldlab_core::db::{open_db, open_db_existing};
use fieldlab_core::index::{open_index, open_index_existing};
use fieldlab_core::repo::attribute_repo::SqliteAttributeRepository;
use fieldlab_core::repo::record_repo::SqliteRecordRepository;
use fieldlab_core::search::{AttributePath, FilterBound};
use fieldlab_core::{
    init_from_config, Backend, CatalogService, CreateRecordRequest, EngineConfig, Filter,
    FilterOperator, FilterValue, IndexSync, NewAttributeDefinition, QueryDispatcher,
    RecordService, SearchQuery, SortDirection, SortTerm, SqliteDocumentIndex, ValueType,
};
use log::info;
use std::collections::BTreeMap;
use std::error::Error;
use std::process::ExitCode;

const DEFAULT_DB_PATH: &str = "fieldlab.db";
const DEFAULT_INDEX_PATH: &str = "fieldlab-index.db";

type CliResult<T> = Result<T, Box<dyn Error>>;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let config = resolve_config(&cli)?;
    init_from_config(&config)?;

    match cli.command {
        Commands::Init => {
            open_db(&config.relational_path)?;
            open_index(&config.index_path)?;
            println!(
                "initialized {} and {}",
                config.relational_path.display(),
                config.index_path.display()
            );
        }
        Commands::Define {
            label,
            wire,
            value_type,
            options,
            required,
            order,
        } => {
            let value_type = ValueType::parse(&value_type)
                .ok_or_else(|| format!("unknown value type `{value_type}`"))?;
            let mut request =
                NewAttributeDefinition::new(label, wire, value_type).with_display_order(order);
            if !options.is_empty() {
                request = request.with_options(options);
            }
            if required {
                request = request.required();
            }

            let conn = open_db_existing(&config.relational_path)?;
            let definition =
                CatalogService::new(SqliteAttributeRepository::new(&conn)).create_definition(request)?;
            println!("{}", serde_json::to_string_pretty(&definition)?);
        }
        Commands::Add {
            name,
            email,
            fields,
        } => {
            let request = CreateRecordRequest {
                name,
                email,
                custom_fields: parse_fields(&fields)?,
            };

            let conn = open_db_existing(&config.relational_path)?;
            let service = RecordService::new(
                SqliteRecordRepository::new(&conn),
                SqliteAttributeRepository::new(&conn),
            );
            let (record, event) = service.create_record(&request)?;

            let index_conn = open_index_existing(&config.index_path)?;
            IndexSync::new(SqliteDocumentIndex::new(&index_conn)).apply(&event)?;
            info!("event=cli_add module=cli status=ok");
            println!("{}", record.id());
        }
        Commands::Search {
            backend,
            text,
            filters,
            sort,
            page,
            page_size,
            group_by,
        } => {
            let backend =
                Backend::parse(&backend).ok_or_else(|| format!("unknown backend `{backend}`"))?;
            let mut query = SearchQuery::new(backend).with_page(page, page_size);
            if let Some(text) = text {
                query = query.with_free_text(text);
            }
            for raw in &filters {
                query = query.with_filter(parse_filter(raw)?);
            }
            for raw in &sort {
                query = query.with_sort(parse_sort(raw)?);
            }
            if let Some(path) = group_by {
                query = query.with_group_by(AttributePath::from(path));
            }

            let result = QueryDispatcher::from_config(&config).search(&query)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}

/// Config file (if any), then `FIELDLAB_*` variables, then flags.
fn resolve_config(cli: &Cli) -> CliResult<EngineConfig> {
    let base = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::new(DEFAULT_DB_PATH, DEFAULT_INDEX_PATH),
    };
    let mut config = base.with_env_overrides()?;
    if let Some(db) = &cli.db {
        config.relational_path = db.clone();
    }
    if let Some(index) = &cli.index {
        config.index_path = index.clone();
    }
    if let Some(log_dir) = &cli.log_dir {
        config.log_dir = Some(log_dir.clone());
    }
    Ok(config)
}

fn parse_fields(raw: &[String]) -> CliResult<BTreeMap<String, String>> {
    raw.iter()
        .map(|entry| {
            let (wire_name, value) = entry
                .split_once('=')
                .ok_or_else(|| format!("field `{entry}` must be wire=value"))?;
            Ok((wire_name.trim().to_string(), value.to_string()))
        })
        .collect()
}

fn parse_filter(raw: &str) -> CliResult<Filter> {
    let mut parts = raw.splitn(3, ':');
    let (Some(path), Some(operator), Some(value)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("filter `{raw}` must be path:operator:value").into());
    };
    let operator = FilterOperator::parse(operator)
        .ok_or_else(|| format!("unknown operator `{operator}` in `{raw}`"))?;

    let value = if operator == FilterOperator::Between {
        let (low, high) = value
            .split_once("..")
            .ok_or_else(|| format!("between filter `{raw}` needs low..high"))?;
        FilterValue::Range(FilterBound::from(low), FilterBound::from(high))
    } else {
        FilterValue::single(value)
    };
    Ok(Filter::new(path, operator, value))
}

fn parse_sort(raw: &str) -> CliResult<SortTerm> {
    let (path, direction) = match raw.rsplit_once(':') {
        Some((path, "desc")) => (path, SortDirection::Desc),
        Some((path, "asc")) => (path, SortDirection::Asc),
        Some(_) => return Err(format!("sort `{raw}` must be path or path:asc|desc").into()),
        None => (raw, SortDirection::Asc),
    };
    Ok(SortTerm::new(path, direction))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_filter_triples_and_ranges() {
        let filter = parse_filter("tier__c:eq:gold").unwrap();
        assert_eq!(filter.operator, FilterOperator::Eq);
        assert_eq!(filter.value, FilterValue::single("gold"));

        let range = parse_filter("joined__c:between:2019-01-01..2020-12-31").unwrap();
        assert_eq!(
            range.value,
            FilterValue::range("2019-01-01", "2020-12-31")
        );

        assert!(parse_filter("tier__c:eq").is_err());
        assert!(parse_filter("tier__c:like:gold").is_err());
    }

    #[test]
    fn parses_sort_direction_suffix() {
        let term = parse_sort("createdAt:desc").unwrap();
        assert_eq!(term.direction, SortDirection::Desc);
        assert_eq!(parse_sort("score__c").unwrap().direction, SortDirection::Asc);
        assert!(parse_sort("score__c:sideways").is_err());
    }

    #[test]
    fn parses_field_assignments() {
        let fields = parse_fields(&["tier__c=gold".to_string(), "note__c=a=b".to_string()]).unwrap();
        assert_eq!(fields["tier__c"], "gold");
        assert_eq!(fields["note__c"], "a=b");
        assert!(parse_fields(&["broken".to_string()]).is_err());
    }
}
