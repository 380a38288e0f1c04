use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use dmv_diagram::config::{Config, load_config};
use dmv_diagram::layout::{self, GridLayout, LayoutAlgorithm};
use dmv_diagram::metadata::{Catalog, Entity};
use dmv_diagram::model::DiagramGraph;
use dmv_diagram::relationships::relationships_between;
use dmv_diagram::routing::RoutingBridge;
use dmv_diagram::serialization::{
    DiagramDocument, deserialize_diagram_with_metrics, load_diagram, serialize_diagram,
    serialize_with_identity, suggested_file_name, to_json,
};
use dmv_diagram::svg::SvgRenderer;
use dmv_diagram::viewport::Viewport;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ROUTE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "dmvd", version, about = "Dataverse data model diagrams")]
struct Args {
    /// Config JSON file
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a diagram from a group or a list of entities
    New {
        #[arg(short = 'm', long)]
        metadata: PathBuf,
        #[arg(short = 'g', long, conflicts_with = "entity")]
        group: Option<String>,
        #[arg(short = 'e', long)]
        entity: Vec<String>,
        #[arg(short = 'n', long, default_value = "Diagram")]
        name: String,
        /// Output file. Defaults to `<name>_<timestamp>.json`
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
    /// Add entities to a saved diagram
    Add {
        #[arg(short = 'm', long)]
        metadata: PathBuf,
        #[arg(short = 'd', long)]
        diagram: PathBuf,
        #[arg(short = 'e', long, required = true)]
        entity: Vec<String>,
        /// Output file. Defaults to overwriting the diagram
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
    /// Rearrange every entity of a saved diagram
    Layout {
        #[arg(short = 'm', long)]
        metadata: PathBuf,
        #[arg(short = 'd', long)]
        diagram: PathBuf,
        /// grid, smart, hierarchical or force. Defaults to the config's algorithm
        #[arg(short = 'a', long)]
        algorithm: Option<LayoutAlgorithm>,
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
    /// Render a saved diagram to SVG
    Render {
        #[arg(short = 'm', long)]
        metadata: PathBuf,
        #[arg(short = 'd', long)]
        diagram: PathBuf,
        /// Output file (default: stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
    /// Print the relationships between two entities
    Relationships {
        #[arg(short = 'm', long)]
        metadata: PathBuf,
        #[arg(short = 'e', long, num_args = 2, required = true)]
        entity: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    match args.command {
        Command::New {
            metadata,
            group,
            entity,
            name,
            output,
        } => {
            let catalog = load_catalog(&metadata)?;
            let entities: Vec<&Entity> = match &group {
                Some(group) => catalog
                    .group(group)
                    .ok_or_else(|| anyhow!("Group not found: {}", group))?
                    .entities
                    .iter()
                    .collect(),
                None => find_entities(&catalog, &entity)?,
            };
            if entities.is_empty() {
                return Err(anyhow!("Nothing to add: pass --group or --entity"));
            }

            let mut graph = DiagramGraph::with_metrics(config.diagram_type, config.metrics.clone());
            graph.add_entities(&entities, &GridLayout::new(config.layout.grid.clone()));
            graph.link_all(&catalog);
            route(&mut graph, &config)?;

            let mut viewport = Viewport::new(config.viewport.clone());
            if let Some(bounds) = graph.bbox() {
                viewport.fit_to(bounds, config.layout.grid.margin);
            }
            let doc = serialize_diagram(&graph, &viewport, &name);
            let output = output.unwrap_or_else(|| PathBuf::from(suggested_file_name(&doc)));
            write_document(&doc, &output)
        }
        Command::Add {
            metadata,
            diagram,
            entity,
            output,
        } => {
            let catalog = load_catalog(&metadata)?;
            let (doc, mut graph, viewport) = open(&diagram, &catalog, &config)?;
            let entities = find_entities(&catalog, &entity)?;

            let added = graph.add_entities(&entities, &GridLayout::new(config.layout.grid.clone()));
            if added.is_empty() {
                eprintln!("All entities are already in the diagram");
            }
            for e in &entities {
                graph.link_entity(&e.schema_name, &catalog)?;
            }
            route(&mut graph, &config)?;

            let doc = serialize_with_identity(&graph, &viewport, &doc);
            write_document(&doc, output.as_deref().unwrap_or(&diagram))
        }
        Command::Layout {
            metadata,
            diagram,
            algorithm,
            output,
        } => {
            let catalog = load_catalog(&metadata)?;
            let (doc, mut graph, viewport) = open(&diagram, &catalog, &config)?;
            let algorithm = algorithm.unwrap_or(config.algorithm);

            layout::arrange(&mut graph, None, algorithm, &config.layout)?;
            route(&mut graph, &config)?;

            let doc = serialize_with_identity(&graph, &viewport, &doc);
            write_document(&doc, output.as_deref().unwrap_or(&diagram))
        }
        Command::Render {
            metadata,
            diagram,
            output,
        } => {
            let catalog = load_catalog(&metadata)?;
            let (_, graph, _) = open(&diagram, &catalog, &config)?;
            let svg = SvgRenderer::new(config.metrics.clone()).render(&graph);
            match output {
                Some(path) => fs::write(&path, &svg)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => print!("{}", svg),
            }
            Ok(())
        }
        Command::Relationships { metadata, entity } => {
            let catalog = load_catalog(&metadata)?;
            let found = find_entities(&catalog, &entity)?;
            let [source, target] = found.as_slice() else {
                return Err(anyhow!("Expected exactly two entities"));
            };
            let relationships = relationships_between(source, target);
            if relationships.is_empty() {
                println!(
                    "No relationships between {} and {}",
                    source.display_name, target.display_name
                );
            }
            for rel in relationships {
                println!(
                    "{:<5} {:<40} {}",
                    rel.kind.as_str(),
                    rel.relationship_schema_name,
                    rel.cascade.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }
    }
}

fn load_catalog(path: &Path) -> Result<Catalog> {
    Catalog::from_path(path).with_context(|| format!("Failed to load metadata {}", path.display()))
}

fn find_entities<'a>(catalog: &'a Catalog, names: &[String]) -> Result<Vec<&'a Entity>> {
    names
        .iter()
        .map(|name| {
            catalog
                .entity(name)
                .ok_or_else(|| anyhow!("Entity not found in metadata: {}", name))
        })
        .collect()
}

fn open(
    path: &Path,
    catalog: &Catalog,
    config: &Config,
) -> Result<(DiagramDocument, DiagramGraph, Viewport)> {
    let doc = load_diagram(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let (graph, viewport) = deserialize_diagram_with_metrics(
        &doc,
        catalog,
        config.viewport.clone(),
        config.metrics.clone(),
    );
    Ok((doc, graph, viewport))
}

/// Route every link on the worker thread and wait for the result.
fn route(graph: &mut DiagramGraph, config: &Config) -> Result<()> {
    if graph.links().is_empty() {
        return Ok(());
    }
    let bridge = RoutingBridge::spawn(config.router.clone())?;
    bridge.reset(graph)?;
    bridge.wait_routed(graph, ROUTE_TIMEOUT)?;
    bridge.shutdown()?;
    Ok(())
}

fn write_document(doc: &DiagramDocument, path: &Path) -> Result<()> {
    fs::write(path, to_json(doc)?).with_context(|| format!("Failed to write {}", path.display()))?;
    eprintln!("Saved {}", path.display());
    Ok(())
}
