//! nixio-dump - print the entity tree of a nixio container.
//!
//! Logging follows `RUST_LOG` (default `warn`), or `-v`/`-vv`.

use anyhow::{Context, Result};
use clap::Parser;
use nixio::prelude::*;
use nixio::{Block, DataArray, File, FileMode, Section, Source};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

/// Print the blocks and metadata sections of a nixio container
#[derive(Parser)]
#[command(name = "nixio-dump")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Print the entity tree of a nixio container")]
struct Args {
    /// Container to read
    path: PathBuf,

    /// Emit the tree as pretty-printed JSON
    #[arg(long)]
    json: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn node(kind: &str, entity: &dyn NamedEntity) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    map.insert("kind".into(), json!(kind));
    map.insert("name".into(), json!(entity.name()?));
    map.insert("type".into(), json!(entity.type_name()?));
    map.insert("id".into(), json!(entity.id().to_string()));
    if let Some(definition) = entity.definition()? {
        map.insert("definition".into(), json!(definition));
    }
    Ok(map)
}

fn source_node(source: &Source) -> Result<Value> {
    let mut map = node("source", source)?;
    let children = source
        .sources()?
        .iter()
        .map(source_node)
        .collect::<Result<Vec<_>>>()?;
    map.insert("children".into(), Value::Array(children));
    Ok(Value::Object(map))
}

fn data_array_node(array: &DataArray) -> Result<Value> {
    let mut map = node("data_array", array)?;
    let mut details = Map::new();
    if let Some(dtype) = array.data_type()? {
        details.insert("dtype".into(), json!(dtype.to_string()));
    }
    if let Some(extent) = array.data_extent()? {
        details.insert("extent".into(), json!(extent));
    }
    if let Some(unit) = array.unit()? {
        details.insert("unit".into(), json!(unit));
    }
    let dimensions: Vec<String> = array
        .dimensions()
        .to_vec()?
        .iter()
        .map(|d| format!("{:?}", d.dimension_type()))
        .collect();
    details.insert("dimensions".into(), json!(dimensions));
    details.insert("compression".into(), json!(format!("{:?}", array.compression()?)));
    map.insert("details".into(), Value::Object(details));
    Ok(Value::Object(map))
}

fn block_node(block: &Block) -> Result<Value> {
    let mut map = node("block", block)?;
    let mut children = Vec::new();
    for array in block.data_arrays()? {
        children.push(data_array_node(&array)?);
    }
    for source in block.sources()? {
        children.push(source_node(&source)?);
    }
    for tag in block.simple_tags()? {
        let mut tag_map = node("simple_tag", &tag)?;
        tag_map.insert(
            "details".into(),
            json!({
                "position": tag.position()?,
                "extent": tag.extent()?,
                "references": tag.references().len()?,
                "features": tag.features().len()?,
            }),
        );
        children.push(Value::Object(tag_map));
    }
    for tag in block.data_tags()? {
        let mut tag_map = node("data_tag", &tag)?;
        tag_map.insert(
            "details".into(),
            json!({
                "points": tag.position_count()?,
                "references": tag.references().len()?,
                "features": tag.features().len()?,
            }),
        );
        children.push(Value::Object(tag_map));
    }
    map.insert("children".into(), Value::Array(children));
    Ok(Value::Object(map))
}

fn section_node(section: &Section) -> Result<Value> {
    let mut map = node("section", section)?;
    let mut properties = Map::new();
    for property in section.properties()? {
        properties.insert(property.name()?, serde_json::to_value(property.values()?)?);
    }
    if !properties.is_empty() {
        map.insert("details".into(), Value::Object(properties));
    }
    let children = section
        .sections()?
        .iter()
        .map(section_node)
        .collect::<Result<Vec<_>>>()?;
    map.insert("children".into(), Value::Array(children));
    Ok(Value::Object(map))
}

fn dump(file: &File) -> Result<Value> {
    let blocks = file
        .blocks()?
        .iter()
        .map(block_node)
        .collect::<Result<Vec<_>>>()?;
    let sections = file
        .sections()?
        .iter()
        .map(section_node)
        .collect::<Result<Vec<_>>>()?;
    Ok(json!({
        "location": file.location(),
        "format_version": file.format_version().to_string(),
        "size": nixio::utils::format_bytes(file.size_on_disk()? as usize),
        "blocks": blocks,
        "sections": sections,
    }))
}

fn print_tree(value: &Value, depth: usize) {
    let indent = "  ".repeat(depth);
    let field = |key: &str| value.get(key).and_then(Value::as_str).unwrap_or("");
    let mut line = format!("{}{} '{}' ({})", indent, field("kind"), field("name"), field("type"));
    if let Some(Value::Object(details)) = value.get("details") {
        let parts: Vec<String> = details.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        line.push_str(&format!(" [{}]", parts.join(", ")));
    }
    println!("{}", line);
    if let Some(Value::Array(children)) = value.get("children") {
        for child in children {
            print_tree(child, depth + 1);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match args.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let path = args.path.display().to_string();
    debug!(path = %path, json = args.json, "dumping container");
    let file = File::open(&args.path, FileMode::ReadOnly)
        .with_context(|| format!("failed to open {}", path))?;
    let tree = dump(&file)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else {
        println!(
            "{} (format {}, {})",
            tree["location"].as_str().unwrap_or(&path),
            tree["format_version"].as_str().unwrap_or("?"),
            tree["size"].as_str().unwrap_or("?"),
        );
        for key in ["blocks", "sections"] {
            if let Some(Value::Array(items)) = tree.get(key) {
                for item in items {
                    print_tree(item, 1);
                }
            }
        }
    }
    file.close()?;
    Ok(())
}
