//! Graphviz export of compiled graphs, for offline debugging.
//!
//! Every batch becomes a `rank = same` row. Passes are colored by batch, drawn bold for graphics passes and dashed
//! otherwise. Dependency edges are labelled with the resources that order the passes, and each batch gets a chain of
//! barrier nodes describing the transitions that run before it.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{EdgeReference, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::backend::Backend;
use crate::Error;
use crate::graph::compile::{BakedGraph, Batch, DependencyGraph};
use crate::graph::pass::{PassKind, SharedResource};
use crate::graph::usage::usage_string;

/// Trait that is implemented for compiled graphs to help with debugging and visualizing them.
pub trait GraphViz {
    /// Get the string representation of this graph in `dot` format.
    fn dot(&self) -> Result<String>;
}

const BATCH_COLORS: [&str; 5] = ["red", "green", "blue", "magenta", "cyan"];

impl<B: Backend> BakedGraph<B> {
    fn shared_resource_name(&self, resource: SharedResource) -> &str {
        match resource {
            SharedResource::RenderTarget(index) => &self.render_targets[index].info.name,
            SharedResource::Buffer(index) => &self.buffers[index].name,
            SharedResource::AccelerationStructure(index) => &self.acceleration_structures[index].name,
        }
    }

    fn barrier_labels(&self, batch: &Batch) -> Vec<String> {
        let textures = batch.texture_transitions.iter().map(|transition| {
            let surface = transition.surface;
            format!(
                "{} (mip {}, layer {}, face {})\\n{} -> {}",
                self.render_targets[transition.handle.index()].info.name,
                surface.mip,
                surface.layer,
                surface.face,
                usage_string(transition.before),
                usage_string(transition.after)
            )
        });
        let buffers = batch.buffer_transitions.iter().map(|transition| {
            format!(
                "{}\\n{} -> {}",
                self.buffers[transition.handle.index()].name,
                usage_string(transition.before),
                usage_string(transition.after)
            )
        });
        let acceleration_structures = batch.acceleration_structure_transitions.iter().map(|transition| {
            format!(
                "{}\\n{} -> {}",
                self.acceleration_structures[transition.handle.index()].name,
                usage_string(transition.before),
                usage_string(transition.after)
            )
        });
        textures.chain(buffers).chain(acceleration_structures).collect()
    }
}

impl<B: Backend> GraphViz for BakedGraph<B> {
    fn dot(&self) -> Result<String> {
        let edge_attributes = |_: &DependencyGraph, edge: EdgeReference<'_, Vec<SharedResource>>| {
            let names = edge
                .weight()
                .iter()
                .map(|&resource| self.shared_resource_name(resource))
                .collect::<Vec<_>>()
                .join(", ");
            format!("label = \"{names}\"")
        };
        let node_attributes = |_: &DependencyGraph, (_, &pass): (NodeIndex, &usize)| {
            let pass = &self.passes[pass];
            let style = match pass.kind {
                PassKind::Graphics => "bold",
                PassKind::NonGraphics => "dashed",
            };
            format!(
                "label = \"{}\" color = {} style = {style}",
                pass.name,
                BATCH_COLORS[pass.batch % BATCH_COLORS.len()]
            )
        };

        let mut dot = String::from("digraph {\n    node [shape = rectangle fontname = \"Helvetica-Bold\"]\n");
        write!(
            dot,
            "{:?}",
            Dot::with_attr_getters(
                &self.dependencies,
                &[Config::GraphContentOnly, Config::NodeNoLabel, Config::EdgeNoLabel],
                &edge_attributes,
                &node_attributes
            )
        )?;

        for (index, batch) in self.batches.iter().enumerate() {
            let color = BATCH_COLORS[index % BATCH_COLORS.len()];
            let members = batch.passes.iter().map(|pass| pass.to_string()).collect::<Vec<_>>().join("; ");
            writeln!(dot, "    subgraph batch_{index} {{ rank = same; {members} }}")?;

            let labels = self.barrier_labels(batch);
            for (barrier, label) in labels.iter().enumerate() {
                writeln!(dot, "    \"b{index}_{barrier}\" [shape = box label = \"{label}\" color = {color}]")?;
                if barrier > 0 {
                    writeln!(dot, "    \"b{index}_{}\" -> \"b{index}_{barrier}\"", barrier - 1)?;
                }
            }
            if let Some(last) = labels.len().checked_sub(1) {
                for pass in &batch.passes {
                    writeln!(dot, "    \"b{index}_{last}\" -> {pass} [style = dotted]")?;
                }
            }
        }
        dot.push_str("}\n");
        Ok(dot)
    }
}

fn dump_failed(path: &Path, err: std::io::Error) -> anyhow::Error {
    error!("Failed to write dependency dump `{}`: {err}", path.display());
    anyhow::Error::from(Error::DotDumpFailed(err))
}

/// Write `rgraph_{generation}.dot` into `dir`, creating the directory if needed. Returns the path of the written file.
pub(crate) fn write_dot_file<B: Backend>(graph: &BakedGraph<B>, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(format!("rgraph_{:05}.dot", graph.generation));
    let contents = graph.dot()?;
    std::fs::create_dir_all(dir)
        .and_then(|_| std::fs::write(&path, &contents))
        .map_err(|err| dump_failed(&path, err))?;
    #[cfg(feature = "dot-svg")]
    write_svg(&path, &contents)?;
    debug!("Wrote dependency dump to `{}`", path.display());
    Ok(path)
}

#[cfg(feature = "dot-svg")]
fn write_svg(path: &Path, contents: &str) -> Result<()> {
    use layout::backends::svg::SVGWriter;
    use layout::gv::{DotParser, GraphBuilder};

    let mut parser = DotParser::new(contents);
    let graph = match parser.process() {
        Ok(graph) => graph,
        Err(err) => {
            warn!("Could not lay out dependency dump `{}`: {err}", path.display());
            return Ok(());
        }
    };
    let mut builder = GraphBuilder::new();
    builder.visit_graph(&graph);
    let mut visual = builder.get();
    let mut svg = SVGWriter::new();
    visual.do_it(false, false, false, &mut svg);
    let svg_path = path.with_extension("svg");
    std::fs::write(&svg_path, svg.finalize()).map_err(|err| dump_failed(&svg_path, err))
}
