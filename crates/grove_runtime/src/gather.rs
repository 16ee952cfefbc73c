//! Collecting the fields selected on one object.
//!
//! Selections are gathered per result node: repeated response keys merge,
//! fragments are inlined when the object's type satisfies their condition,
//! and selections excluded by an `include` directive hook disappear. A
//! fragment carrying a runtime directive starts its own group, so the
//! directive can wrap the evaluation of exactly the fields it contributed.

use crate::arguments::{ArgumentOwner, ArgumentsCache, ArgumentsResult, Coercion};
use crate::directives::DirectiveLocation;
use crate::schema::Schema;
use crate::value::Value;
use grove_syntax::ast;
use indexmap::IndexMap;

/// The AST nodes selected under one response key.
#[derive(Debug, Clone)]
pub enum SelectionNode<'q> {
    Single(&'q ast::Field),
    /// The key is selected more than once; sub-selections combine.
    Merged(Vec<&'q ast::Field>),
}

impl<'q> SelectionNode<'q> {
    /// The node arguments and locations are taken from.
    pub fn first(&self) -> &'q ast::Field {
        self.nodes()[0]
    }

    pub fn nodes(&self) -> &[&'q ast::Field] {
        match self {
            Self::Single(field) => std::slice::from_ref(field),
            Self::Merged(fields) => fields,
        }
    }

    fn push(&mut self, field: &'q ast::Field) {
        match self {
            Self::Single(first) => *self = Self::Merged(vec![*first, field]),
            Self::Merged(fields) => fields.push(field),
        }
    }
}

/// Fields in selection order, with the directives of the fragment that
/// opened the group.
#[derive(Debug, Clone)]
pub struct SelectionGroup<'q> {
    pub fields: IndexMap<&'q str, SelectionNode<'q>>,
    pub directives: &'q [ast::Directive],
    /// Where `directives` were applied.
    pub location: DirectiveLocation,
}

impl<'q> SelectionGroup<'q> {
    fn new(directives: &'q [ast::Directive], location: DirectiveLocation) -> Self {
        Self {
            fields: IndexMap::new(),
            directives,
            location,
        }
    }
}

/// Gathers `selections` for `object` of type `type_name`.
///
/// Returns a single group unless a fragment with a runtime directive was
/// found; the first group then holds everything outside such fragments.
pub(crate) fn gather_selections<'q>(
    input: Coercion<'q>,
    document: &'q ast::Document,
    cache: &mut ArgumentsCache,
    object: &Value,
    type_name: &str,
    selections: impl IntoIterator<Item = &'q ast::Selection>,
) -> Vec<SelectionGroup<'q>> {
    let mut gatherer = Gatherer {
        input,
        document,
        cache,
        object,
        type_name,
        groups: vec![SelectionGroup::new(&[], DirectiveLocation::Field)],
        visiting: Vec::new(),
    };
    for selection in selections {
        gatherer.selection(selection, 0);
    }
    gatherer.groups
}

struct Gatherer<'q, 'g> {
    input: Coercion<'q>,
    document: &'q ast::Document,
    cache: &'g mut ArgumentsCache,
    object: &'g Value,
    type_name: &'g str,
    groups: Vec<SelectionGroup<'q>>,
    visiting: Vec<&'q str>,
}

impl<'q, 'g> Gatherer<'q, 'g> {
    fn schema(&self) -> &'q Schema {
        self.input.schema
    }

    fn selections(&mut self, selections: &'q [ast::Selection], group: usize) {
        for selection in selections {
            self.selection(selection, group);
        }
    }

    fn selection(&mut self, selection: &'q ast::Selection, group: usize) {
        let location = DirectiveLocation::of_selection(selection);
        if !self.directives_include(selection.directives(), location) {
            return;
        }
        let (directives, condition, selections, fragment_name) = match selection {
            ast::Selection::Field(field) => {
                self.groups[group]
                    .fields
                    .entry(field.response_key())
                    .and_modify(|existing| existing.push(field))
                    .or_insert(SelectionNode::Single(field));
                return;
            }
            ast::Selection::InlineFragment(fragment) => (
                &fragment.directives,
                fragment.type_condition.as_ref(),
                &fragment.selection_set.selections,
                None,
            ),
            ast::Selection::FragmentSpread(spread) => {
                let Some(fragment) = self.document.fragment(&spread.name.value) else {
                    return;
                };
                if self.visiting.contains(&fragment.name.as_str()) {
                    return;
                }
                (
                    &spread.directives,
                    Some(&fragment.type_condition),
                    &fragment.selection_set.selections,
                    Some(fragment.name.as_str()),
                )
            }
        };

        let applies = condition.map_or(true, |cond| {
            self.schema().is_possible_type(&cond.value, self.type_name)
        });
        if !applies {
            return;
        }

        let group = if self.has_runtime_directive(directives, location) {
            self.groups.push(SelectionGroup::new(directives, location));
            self.groups.len() - 1
        } else {
            group
        };

        self.visiting.extend(fragment_name);
        self.selections(selections, group);
        if fragment_name.is_some() {
            self.visiting.pop();
        }
    }

    fn has_runtime_directive(&self, directives: &[ast::Directive], location: DirectiveLocation) -> bool {
        directives.iter().any(|directive| {
            self.schema()
                .directive(&directive.name.value)
                .is_some_and(|def| def.is_runtime() && def.allows(location))
        })
    }

    /// Runs every `include` hook on the selection's directives. Unknown or
    /// misplaced directives and directives whose arguments fail to coerce
    /// keep the selection.
    fn directives_include(
        &mut self,
        directives: &'q [ast::Directive],
        location: DirectiveLocation,
    ) -> bool {
        directives.iter().all(|node| {
            let Some(def) = self
                .schema()
                .directive(&node.name.value)
                .filter(|def| def.allows(location))
            else {
                return true;
            };
            if !def.has_include() {
                return true;
            }
            let address = node as *const ast::Directive as usize;
            let mut result = self.cache.fetch(
                ArgumentOwner::Directive(def),
                address,
                &node.arguments,
                self.object,
                self.input,
            );
            loop {
                match result {
                    ArgumentsResult::Ready(args) => {
                        return def.include(self.object, &args, self.input.ctx)
                    }
                    ArgumentsResult::Error(_) => return true,
                    ArgumentsResult::Lazy(lazy) => result = lazy.force(),
                }
            }
        })
    }
}
