//! Catalog group forest and the group-related body sections.
//!
//! Turns flat `GROUP_ID` / `GROUP_NAME` / `PARENT_ID` rows into a rooted
//! forest, then renders `<CATALOG_GROUP_SYSTEM>` and `<ARTICLE_TO_GROUP_MAP>`.

use std::collections::HashMap;
use std::fmt::Write;

use tracing::{debug, instrument, warn};

use bmecat_shared::{BmecatError, BmecatField, CatalogGroup, NormalizedRow, Result, StructureRow};

use crate::xml::escape_xml;

/// Indentation of `<CATALOG_GROUP_SYSTEM>` and `<ARTICLE_TO_GROUP_MAP>` inside `<T_NEW_CATALOG>`.
const BODY_INDENT: usize = 4;

/// Build the group forest from structure rows.
///
/// A row whose `PARENT_ID` is empty or names no known group becomes a root.
/// Children keep the order of the flat list. The first row for a `GROUP_ID`
/// wins; later duplicates are skipped.
#[instrument(skip_all, fields(rows = rows.len()))]
pub fn build_group_tree(rows: &[StructureRow]) -> Result<Vec<CatalogGroup>> {
    // Pass one: index unique ids
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(rows.len());
    let mut nodes: Vec<&StructureRow> = Vec::with_capacity(rows.len());
    for row in rows {
        if index.contains_key(row.group_id.as_str()) {
            warn!(group_id = %row.group_id, "duplicate GROUP_ID, keeping first occurrence");
            continue;
        }
        index.insert(row.group_id.as_str(), nodes.len());
        nodes.push(row);
    }

    // Pass two: attach to parent or root list
    let parents: Vec<Option<usize>> = nodes
        .iter()
        .map(|row| {
            if row.parent_id.is_empty() {
                None
            } else {
                index.get(row.parent_id.as_str()).copied()
            }
        })
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut roots = Vec::new();
    for (idx, parent) in parents.iter().enumerate() {
        match parent {
            Some(p) => children[*p].push(idx),
            None => roots.push(idx),
        }
    }

    // Anything unreachable from a root sits on or below a parent cycle
    let mut reached = vec![false; nodes.len()];
    let mut stack = roots.clone();
    while let Some(idx) = stack.pop() {
        reached[idx] = true;
        stack.extend(children[idx].iter().copied());
    }
    if let Some(start) = reached.iter().position(|r| !r) {
        let on_cycle = find_cycle_member(start, &parents);
        return Err(BmecatError::CyclicGroup {
            group_id: nodes[on_cycle].group_id.clone(),
        });
    }

    let forest = materialize(&roots, &nodes, &children);

    debug!(roots = forest.len(), groups = nodes.len(), "group tree built");
    Ok(forest)
}

/// Walk up the parent chain from `start` until a node repeats.
fn find_cycle_member(start: usize, parents: &[Option<usize>]) -> usize {
    let mut seen = vec![false; parents.len()];
    let mut current = start;
    loop {
        if seen[current] {
            return current;
        }
        seen[current] = true;
        match parents[current] {
            Some(parent) => current = parent,
            // Unreachable for nodes outside the forest, but stay total.
            None => return start,
        }
    }
}

/// Build owned groups bottom-up so depth never turns into call depth.
fn materialize(roots: &[usize], nodes: &[&StructureRow], children: &[Vec<usize>]) -> Vec<CatalogGroup> {
    // Parents precede their children in `order`
    let mut order = Vec::with_capacity(nodes.len());
    let mut stack = roots.to_vec();
    while let Some(idx) = stack.pop() {
        order.push(idx);
        stack.extend(children[idx].iter().copied());
    }

    let mut built: Vec<Option<CatalogGroup>> = Vec::new();
    built.resize_with(nodes.len(), || None);
    for &idx in order.iter().rev() {
        let row = nodes[idx];
        let group = CatalogGroup {
            id: row.group_id.clone(),
            name: row.group_name.clone(),
            parent_id: (!row.parent_id.is_empty()).then(|| row.parent_id.clone()),
            children: children[idx]
                .iter()
                .filter_map(|&child| built[child].take())
                .collect(),
        };
        built[idx] = Some(group);
    }

    roots.iter().filter_map(|&idx| built[idx].take()).collect()
}

/// Total number of groups in a forest.
pub fn group_count(groups: &[CatalogGroup]) -> usize {
    groups.iter().map(CatalogGroup::subtree_size).sum()
}

/// Render the `<CATALOG_GROUP_SYSTEM>` section, or nothing for an empty forest.
pub fn render_group_system(groups: &[CatalogGroup]) -> String {
    if groups.is_empty() {
        return String::new();
    }
    let pad = " ".repeat(BODY_INDENT);
    let mut out = format!("\n{pad}<CATALOG_GROUP_SYSTEM>");
    render_groups(&mut out, groups, 0);
    let _ = write!(out, "\n{pad}</CATALOG_GROUP_SYSTEM>");
    out
}

enum GroupStep<'a> {
    Open(&'a CatalogGroup, usize),
    Close(usize),
}

fn render_groups(out: &mut String, groups: &[CatalogGroup], level: usize) {
    let mut stack: Vec<GroupStep<'_>> = groups
        .iter()
        .rev()
        .map(|group| GroupStep::Open(group, level))
        .collect();

    while let Some(step) = stack.pop() {
        match step {
            GroupStep::Open(group, level) => {
                let pad = " ".repeat(BODY_INDENT + 2 + level * 2);
                let _ = write!(out, "\n{pad}<GROUP>");
                let _ = write!(out, "\n{pad}  <GROUP_ID>{}</GROUP_ID>", escape_xml(&group.id));
                let _ = write!(
                    out,
                    "\n{pad}  <GROUP_NAME>{}</GROUP_NAME>",
                    escape_xml(&group.name)
                );
                stack.push(GroupStep::Close(level));
                stack.extend(
                    group
                        .children
                        .iter()
                        .rev()
                        .map(|child| GroupStep::Open(child, level + 1)),
                );
            }
            GroupStep::Close(level) => {
                let pad = " ".repeat(BODY_INDENT + 2 + level * 2);
                let _ = write!(out, "\n{pad}</GROUP>");
            }
        }
    }
}

/// Render one `<ARTICLE_TO_GROUP_MAP>` per row that has both an article id and a group id.
pub fn render_article_group_map(rows: &[NormalizedRow]) -> String {
    let pad = " ".repeat(BODY_INDENT);
    let mut out = String::new();
    for row in rows {
        let aid = row.field(BmecatField::SupplierAid);
        let group = row.field(BmecatField::CatalogGroupId);
        if aid.is_empty() || group.is_empty() {
            continue;
        }
        let _ = write!(
            out,
            "\n{pad}<ARTICLE_TO_GROUP_MAP>\n{pad}  <ART_ID>{}</ART_ID>\n{pad}  <CATALOG_GROUP_ID>{}</CATALOG_GROUP_ID>\n{pad}</ARTICLE_TO_GROUP_MAP>",
            escape_xml(aid),
            escape_xml(group),
        );
    }
    out
}
