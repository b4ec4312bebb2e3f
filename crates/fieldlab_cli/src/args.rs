use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fieldlab")]
#[command(about = "Records with custom fields, searched over EAV rows or a document index", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON config file (relational_path, index_path, catalog_ttl_secs, ...)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Relational database file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Document index database file
    #[arg(long, global = true)]
    pub index: Option<PathBuf>,

    /// Absolute directory for rolling log files
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create both stores and apply migrations
    Init,

    /// Define a custom field
    Define {
        /// Display label
        #[arg(long)]
        label: String,

        /// Wire name, e.g. tier__c
        #[arg(long)]
        wire: String,

        /// text | number | date | enum
        #[arg(long = "type")]
        value_type: String,

        /// Enum option (repeatable)
        #[arg(long = "option")]
        options: Vec<String>,

        #[arg(long)]
        required: bool,

        #[arg(long, default_value_t = 0)]
        order: i64,
    },

    /// Add a record and push it to the index
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        /// Custom field value as wire=value (repeatable)
        #[arg(long = "field")]
        fields: Vec<String>,
    },

    /// Search either backend and print the result envelope as JSON
    Search {
        /// relational | indexed (aliases: mysql, es)
        #[arg(long, default_value = "relational")]
        backend: String,

        /// Free text matched against name and email
        #[arg(long)]
        text: Option<String>,

        /// Filter as path:operator:value; between takes low..high (repeatable)
        #[arg(long = "filter")]
        filters: Vec<String>,

        /// Sort term as path or path:desc (repeatable)
        #[arg(long = "sort")]
        sort: Vec<String>,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 20)]
        page_size: u32,

        /// Count filtered records per value of this path
        #[arg(long)]
        group_by: Option<String>,
    },
}
