use crate::geometry::{Point, Rect};
use crate::measure::TextMetrics;
use crate::model::{DiagramGraph, DiagramKind, EntityNode, Link, Node, NodeKind, PortSide};
use std::fmt::{self, Write};

const PORT_RADIUS: f64 = 4.0;

/// Static SVG picture of a diagram, for export and the CLI.
pub struct SvgRenderer {
    metrics: TextMetrics,
    margin: f64,
}

impl Default for SvgRenderer {
    fn default() -> Self {
        Self::new(TextMetrics::default())
    }
}

impl SvgRenderer {
    pub fn new(metrics: TextMetrics) -> Self {
        Self {
            metrics,
            margin: 40.0,
        }
    }

    pub fn render(&self, graph: &DiagramGraph) -> String {
        let mut svg = String::new();
        // writing into a String does not fail
        let _ = self.write_document(&mut svg, graph);
        svg
    }

    fn write_document(&self, svg: &mut String, graph: &DiagramGraph) -> fmt::Result {
        let m = self.margin;
        let view = match graph.bbox() {
            Some(b) => Rect::new(b.x - m, b.y - m, b.width + m * 2.0, b.height + m * 2.0),
            None => Rect::new(0.0, 0.0, m * 2.0, m * 2.0),
        };
        writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="{} {} {} {}">"#,
            view.width, view.height, view.x, view.y, view.width, view.height
        )?;

        writeln!(
            svg,
            r#"<style>
  .entity-bg {{ fill: #fff; }}
  .entity-header {{ fill: #e8eef7; }}
  .entity-border {{ fill: none; stroke: #333; stroke-width: 1.5; }}
  .entity-name {{ font-family: sans-serif; font-size: 14px; font-weight: bold; }}
  .attribute {{ font-family: monospace; font-size: 12px; }}
  .pk {{ font-weight: bold; }}
  .lookup {{ font-style: italic; }}
  .port {{ fill: #4a78c2; }}
  .link {{ stroke: #666; stroke-width: 1.5; fill: none; }}
  .link-label {{ font-family: monospace; font-size: 11px; fill: #666; }}
  .selection {{ fill: rgba(74, 120, 194, 0.08); stroke: #4a78c2; stroke-dasharray: 6 4; }}
</style>"#
        )?;

        let mut nodes: Vec<&Node> = graph.nodes().iter().collect();
        nodes.sort_by_key(|n| n.z);

        // containers sit below links, links below entities
        for node in nodes.iter().filter(|n| n.is_selection()) {
            let b = node.bbox();
            writeln!(
                svg,
                r#"<rect class="selection" x="{}" y="{}" width="{}" height="{}" rx="6" />"#,
                b.x, b.y, b.width, b.height
            )?;
        }
        for link in graph.links() {
            self.write_link(svg, graph, link)?;
        }
        for node in &nodes {
            if let NodeKind::Entity(entity) = &node.kind {
                self.write_entity(svg, node, entity, graph.kind())?;
            }
        }

        writeln!(svg, "</svg>")
    }

    fn write_entity(
        &self,
        svg: &mut String,
        node: &Node,
        entity: &EntityNode,
        kind: DiagramKind,
    ) -> fmt::Result {
        let Point { x, y } = node.position;
        let w = node.size.width;
        let h = node.size.height;
        let header_h = match kind {
            DiagramKind::Simple => h,
            DiagramKind::Detailed => self.metrics.header_height.min(h),
        };

        writeln!(
            svg,
            r#"<g class="entity" data-id="{}" data-schema="{}">"#,
            escape_xml(&node.id),
            escape_xml(&entity.schema_name)
        )?;
        writeln!(
            svg,
            r#"<rect class="entity-bg" x="{}" y="{}" width="{}" height="{}" rx="4" />"#,
            x, y, w, h
        )?;
        writeln!(
            svg,
            r#"<rect class="entity-header" x="{}" y="{}" width="{}" height="{}" rx="4" />"#,
            x, y, w, header_h
        )?;
        writeln!(
            svg,
            r#"<text class="entity-name" x="{}" y="{}" text-anchor="middle">{}</text>"#,
            x + w / 2.0,
            y + header_h / 2.0 + 5.0,
            escape_xml(&entity.display_name)
        )?;

        if kind == DiagramKind::Detailed && !entity.attributes.is_empty() {
            writeln!(
                svg,
                r##"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="#333" stroke-width="1" />"##,
                x,
                y + header_h,
                x + w,
                y + header_h
            )?;
            for (i, attr) in entity.attributes.iter().enumerate() {
                let mut class = "attribute".to_string();
                if attr.is_primary_key {
                    class.push_str(" pk");
                }
                if attr.is_lookup {
                    class.push_str(" lookup");
                }
                let prefix = if attr.is_primary_key { "◆ " } else { "  " };
                let text_y = y + self.metrics.row_y(i) + self.metrics.row_height * 0.7;
                writeln!(
                    svg,
                    r#"<text class="{}" x="{}" y="{}">{}{}</text>"#,
                    class,
                    x + self.metrics.padding_x,
                    text_y,
                    prefix,
                    escape_xml(&attr.display_name)
                )?;
                writeln!(
                    svg,
                    r#"<text class="attribute" x="{}" y="{}" text-anchor="end">{}</text>"#,
                    x + w - self.metrics.padding_x,
                    text_y,
                    escape_xml(&attr.type_label)
                )?;
            }
        }

        for port in &entity.ports {
            let cx = match port.side {
                PortSide::Left => x,
                PortSide::Right => x + w,
            };
            writeln!(
                svg,
                r#"<circle class="port" data-port="{}" cx="{}" cy="{}" r="{}" />"#,
                escape_xml(&port.id),
                cx,
                y + port.y,
                PORT_RADIUS
            )?;
        }

        writeln!(
            svg,
            r#"<rect class="entity-border" x="{}" y="{}" width="{}" height="{}" rx="4" />"#,
            x, y, w, h
        )?;
        writeln!(svg, "</g>")
    }

    fn write_link(&self, svg: &mut String, graph: &DiagramGraph, link: &Link) -> fmt::Result {
        let (Some(source), Some(target)) = (graph.node(&link.source.id), graph.node(&link.target.id))
        else {
            return Ok(());
        };
        let mut points = vec![source.anchor(link.source.port.as_deref())];
        points.extend(link.vertices.iter().copied());
        points.push(target.anchor(link.target.port.as_deref()));

        let coords: Vec<String> = points.iter().map(|p| format!("{},{}", p.x, p.y)).collect();
        writeln!(
            svg,
            r#"<polyline class="link" data-id="{}" points="{}" />"#,
            escape_xml(&link.id),
            coords.join(" ")
        )?;

        if let Some(label) = &link.label {
            // middle of the middle segment
            let i = (points.len() - 1) / 2;
            let mid = Point::new((points[i].x + points[i + 1].x) / 2.0, (points[i].y + points[i + 1].y) / 2.0);
            writeln!(
                svg,
                r#"<text class="link-label" x="{}" y="{}" text-anchor="middle">{}</text>"#,
                mid.x,
                mid.y - 5.0,
                escape_xml(label)
            )?;
        }
        Ok(())
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::fixtures::sample_catalog;
    use crate::selection::AreaSelection;

    fn linked_graph(kind: DiagramKind) -> DiagramGraph {
        let catalog = sample_catalog();
        let mut graph = DiagramGraph::new(kind);
        graph
            .add_entity(catalog.entity("account").unwrap(), None, Point::new(0.0, 0.0))
            .unwrap();
        graph
            .add_entity(catalog.entity("contact").unwrap(), None, Point::new(700.0, 0.0))
            .unwrap();
        graph.link_all(&catalog);
        graph
    }

    #[test]
    fn test_render_empty() {
        let svg = SvgRenderer::default().render(&DiagramGraph::default());
        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn test_render_detailed() {
        let svg = SvgRenderer::default().render(&linked_graph(DiagramKind::Detailed));
        assert!(svg.contains(r#"data-schema="account""#));
        assert!(svg.contains("◆ accountid"));
        assert!(svg.contains(r#"class="attribute lookup""#));
        assert!(svg.contains(r#"data-port="port-primarycontactid""#));
        assert!(svg.contains(r#"class="link""#));
    }

    #[test]
    fn test_render_simple_has_no_rows() {
        let svg = SvgRenderer::default().render(&linked_graph(DiagramKind::Simple));
        assert!(svg.contains("account"));
        assert!(!svg.contains("◆"));
        assert!(!svg.contains(r#"class="port""#));
    }

    #[test]
    fn test_render_escapes_and_containers() {
        let mut graph = linked_graph(DiagramKind::Detailed);
        let mut selection = AreaSelection::new();
        selection.select_area(&mut graph, Rect::new(-10.0, -10.0, 2000.0, 2000.0));
        let svg = SvgRenderer::default().render(&graph);
        assert!(svg.contains(r#"class="selection""#));
        assert_eq!(escape_xml(r#"a<b & "c">"#), "a&lt;b &amp; &quot;c&quot;&gt;");
    }
}
