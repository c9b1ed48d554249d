//! Lookups over a pen forest (top-level pens plus nested children).

use super::Pen;

pub fn find_by_id<'a>(pens: &'a [Pen], id: &str) -> Option<&'a Pen> {
    for pen in pens {
        if pen.id() == id {
            return Some(pen);
        }
        if let Some(found) = find_by_id(pen.children(), id) {
            return Some(found);
        }
    }
    None
}

pub fn find_by_id_mut<'a>(pens: &'a mut [Pen], id: &str) -> Option<&'a mut Pen> {
    for pen in pens.iter_mut() {
        if pen.id() == id {
            return Some(pen);
        }
        if let Pen::Node(node) = pen {
            if let Some(found) = find_by_id_mut(&mut node.children, id) {
                return Some(found);
            }
        }
    }
    None
}

/// Every pen whose id or one of whose tags equals `id_or_tag`, depth-first.
pub fn find<'a>(pens: &'a [Pen], id_or_tag: &str) -> Vec<&'a Pen> {
    flatten(pens).into_iter().filter(|pen| pen.props().matches(id_or_tag)).collect()
}

pub fn ids_matching(pens: &[Pen], id_or_tag: &str) -> Vec<String> {
    find(pens, id_or_tag).into_iter().map(|pen| pen.id().to_string()).collect()
}

/// Depth-first, parents before their children.
pub fn flatten(pens: &[Pen]) -> Vec<&Pen> {
    let mut out = Vec::new();
    fn visit<'a>(pens: &'a [Pen], out: &mut Vec<&'a Pen>) {
        for pen in pens {
            out.push(pen);
            visit(pen.children(), out);
        }
    }
    visit(pens, &mut out);
    out
}

pub fn walk_mut(pens: &mut [Pen], f: &mut impl FnMut(&mut Pen)) {
    for pen in pens.iter_mut() {
        f(pen);
        if let Pen::Node(node) = pen {
            walk_mut(&mut node.children, f);
        }
    }
}

/// Detach the pen with `id` from wherever it lives in the forest.
pub fn remove(pens: &mut Vec<Pen>, id: &str) -> Option<Pen> {
    if let Some(index) = pens.iter().position(|pen| pen.id() == id) {
        return Some(pens.remove(index));
    }
    pens.iter_mut().find_map(|pen| match pen {
        Pen::Node(node) => remove(&mut node.children, id),
        Pen::Line(_) => None,
    })
}

pub fn parent_of<'a>(pens: &'a [Pen], id: &str) -> Option<&'a Pen> {
    for pen in pens {
        if pen.children().iter().any(|child| child.id() == id) {
            return Some(pen);
        }
        if let Some(found) = parent_of(pen.children(), id) {
            return Some(found);
        }
    }
    None
}

/// Whether `pen` is `id` or has a descendant with that id.
pub fn contains_id(pen: &Pen, id: &str) -> bool {
    pen.id() == id || pen.children().iter().any(|child| contains_id(child, id))
}

/// Index among the top-level pens of the root that holds `id`.
pub fn root_index(pens: &[Pen], id: &str) -> Option<usize> {
    pens.iter().position(|pen| contains_id(pen, id))
}
