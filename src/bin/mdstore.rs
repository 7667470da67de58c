use mdstore::{CatalogConfig, Partition, PartitionCatalog, PartitionId, share};
use rusqlite::Connection;
use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return Err("missing command".into());
    }
    match args[1].as_str() {
        "init" => cmd_init(&args[2..]),
        "partition" => match args.get(2).map(String::as_str) {
            Some("add") => cmd_partition_add(&args[3..]),
            Some("remove") => cmd_partition_remove(&args[3..]),
            Some("get") => cmd_partition_get(&args[3..]),
            Some("list") => cmd_partition_list(&args[3..]),
            Some("max") => cmd_partition_max(&args[3..]),
            Some(other) => Err(format!("unknown partition command: {other}")),
            None => Err("missing partition subcommand".into()),
        },
        "kv" => match args.get(2).map(String::as_str) {
            Some("put") => cmd_kv_put(&args[3..]),
            Some("get") => cmd_kv_get(&args[3..]),
            Some("delete") => cmd_kv_delete(&args[3..]),
            Some("list") => cmd_kv_list(&args[3..]),
            Some(other) => Err(format!("unknown kv command: {other}")),
            None => Err("missing kv subcommand".into()),
        },
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            print_usage();
            Err(format!("unknown top-level command: {other}"))
        }
    }
}

fn cmd_init(args: &[String]) -> Result<(), String> {
    let catalog = connect(args)?;
    let created = catalog
        .schema()
        .try_create_table()
        .map_err(|e| format!("create table: {e}"))?;
    println!(
        "{}\t{}",
        if created { "created" } else { "exists" },
        catalog.table_name()
    );
    Ok(())
}

fn cmd_partition_add(args: &[String]) -> Result<(), String> {
    let mut catalog = open_catalog(args)?;
    let name = parse_flag_value(args, "--name").ok_or("--name is required")?;
    let id = match parse_flag_value(args, "--id") {
        Some(raw) => raw
            .parse::<PartitionId>()
            .map_err(|e| format!("invalid --id '{raw}': {e}"))?,
        None => {
            let max = catalog
                .try_get_max_partition()
                .map_err(|e| format!("max partition: {e}"))?;
            match max {
                Some(max) => max
                    .checked_add(1)
                    .ok_or("partition identifiers exhausted")?,
                None => 1,
            }
        }
    };
    let partition = Partition::new(id, name);
    catalog
        .try_add_partition(&partition)
        .map_err(|e| format!("add partition: {e}"))?;
    println!("ok\t{}\t{}", partition.name, partition.id);
    Ok(())
}

fn cmd_partition_remove(args: &[String]) -> Result<(), String> {
    let mut catalog = open_catalog(args)?;
    let name = parse_flag_value(args, "--name").ok_or("--name is required")?;
    let removed = catalog
        .try_remove_partition(&Partition::new(0, name.clone()))
        .map_err(|e| format!("remove partition: {e}"))?;
    println!("{}\t{name}", if removed { "removed" } else { "absent" });
    Ok(())
}

fn cmd_partition_get(args: &[String]) -> Result<(), String> {
    let catalog = open_catalog(args)?;
    let name = parse_flag_value(args, "--name").ok_or("--name is required")?;
    match catalog
        .try_get_partition_by_name(&name)
        .map_err(|e| format!("get partition: {e}"))?
    {
        Some(p) => {
            println!("{}\t{}", p.name, p.id);
            Ok(())
        }
        None => Err(format!("partition '{name}' not found")),
    }
}

fn cmd_partition_list(args: &[String]) -> Result<(), String> {
    let catalog = open_catalog(args)?;
    let mut partitions = catalog
        .try_get_all_partitions()
        .map_err(|e| format!("list partitions: {e}"))?
        .into_iter()
        .collect::<Vec<_>>();
    partitions.sort_by_key(|p| p.id);
    if has_flag(args, "--json") {
        let json = serde_json::to_string_pretty(&partitions).map_err(|e| e.to_string())?;
        println!("{json}");
    } else {
        for p in &partitions {
            println!("{}\t{}", p.id, p.name);
        }
    }
    Ok(())
}

fn cmd_partition_max(args: &[String]) -> Result<(), String> {
    let catalog = open_catalog(args)?;
    let max = catalog
        .try_get_max_partition()
        .map_err(|e| format!("max partition: {e}"))?;
    println!("{}", max.unwrap_or(0));
    Ok(())
}

fn cmd_kv_put(args: &[String]) -> Result<(), String> {
    let catalog = open_catalog(args)?;
    let (namespace, keytype, key) = parse_row_key(args)?;
    let value = parse_flag_value(args, "--value").ok_or("--value is required")?;
    catalog
        .put_metadata(&namespace, &keytype, &key, &value)
        .map_err(|e| format!("put: {e}"))?;
    println!("ok");
    Ok(())
}

fn cmd_kv_get(args: &[String]) -> Result<(), String> {
    let catalog = open_catalog(args)?;
    let (namespace, keytype, key) = parse_row_key(args)?;
    match catalog
        .rows()
        .try_lookup(&namespace, &keytype, &key)
        .map_err(|e| format!("get: {e}"))?
    {
        Some(value) => {
            println!("{value}");
            Ok(())
        }
        None => Err(format!("no value for {namespace}/{keytype}/{key}")),
    }
}

fn cmd_kv_delete(args: &[String]) -> Result<(), String> {
    let catalog = open_catalog(args)?;
    let (namespace, keytype, key) = parse_row_key(args)?;
    let removed = catalog
        .remove_metadata(&namespace, &keytype, &key)
        .map_err(|e| format!("delete: {e}"))?;
    println!("{}", if removed { "removed" } else { "absent" });
    Ok(())
}

fn cmd_kv_list(args: &[String]) -> Result<(), String> {
    let catalog = open_catalog(args)?;
    let namespace = parse_flag_value(args, "--namespace").ok_or("--namespace is required")?;
    let keytype = parse_flag_value(args, "--keytype").ok_or("--keytype is required")?;
    let values = catalog
        .rows()
        .try_list_by_type(&namespace, &keytype)
        .map_err(|e| format!("list: {e}"))?;
    if has_flag(args, "--json") {
        let json = serde_json::to_string_pretty(&values).map_err(|e| e.to_string())?;
        println!("{json}");
    } else {
        for (key, value) in &values {
            println!("{key}\t{value}");
        }
    }
    Ok(())
}

fn open_catalog(args: &[String]) -> Result<PartitionCatalog, String> {
    let catalog = connect(args)?;
    catalog.ensure_table();
    Ok(catalog)
}

fn connect(args: &[String]) -> Result<PartitionCatalog, String> {
    let db = parse_flag_value(args, "--db").ok_or("--db is required")?;
    let mut config = CatalogConfig::lazy(mdstore::config::DEFAULT_TABLE_NAME);
    if let Some(table) = parse_flag_value(args, "--table") {
        config = config.with_table_name(table);
    }
    let conn = Connection::open(&db).map_err(|e| format!("open {db}: {e}"))?;
    PartitionCatalog::new(share(conn), &config).map_err(|e| format!("catalog: {e}"))
}

fn parse_row_key(args: &[String]) -> Result<(String, String, String), String> {
    let namespace = parse_flag_value(args, "--namespace").ok_or("--namespace is required")?;
    let keytype = parse_flag_value(args, "--keytype").ok_or("--keytype is required")?;
    let key = parse_flag_value(args, "--key").ok_or("--key is required")?;
    Ok((namespace, keytype, key))
}

fn parse_flag_value(args: &[String], flag: &str) -> Option<String> {
    for idx in 0..args.len() {
        if args[idx] == flag {
            return args.get(idx + 1).cloned();
        }
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn print_usage() {
    eprintln!("usage:");
    eprintln!("  mdstore init --db <file> [--table <name>]");
    eprintln!("  mdstore partition add --db <file> --name <name> [--id <id>] [--table <name>]");
    eprintln!("  mdstore partition remove --db <file> --name <name> [--table <name>]");
    eprintln!("  mdstore partition get --db <file> --name <name> [--table <name>]");
    eprintln!("  mdstore partition list --db <file> [--json] [--table <name>]");
    eprintln!("  mdstore partition max --db <file> [--table <name>]");
    eprintln!(
        "  mdstore kv put --db <file> --namespace <ns> --keytype <type> --key <key> --value <value>"
    );
    eprintln!("  mdstore kv get --db <file> --namespace <ns> --keytype <type> --key <key>");
    eprintln!("  mdstore kv delete --db <file> --namespace <ns> --keytype <type> --key <key>");
    eprintln!("  mdstore kv list --db <file> --namespace <ns> --keytype <type> [--json]");
}
