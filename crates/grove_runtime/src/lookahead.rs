//! A resolver's view of the selections below its field.

use crate::arguments::{input_from_ast, Variables};
use crate::schema::Schema;
use crate::value::Json;
use grove_syntax::ast;
use indexmap::IndexMap;

/// The selections requested below a field, with fragments flattened.
///
/// Arguments are the raw input values after variable substitution, without
/// coercion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lookahead {
    name: String,
    alias: Option<String>,
    arguments: IndexMap<String, Json>,
    selections: Vec<Lookahead>,
}

impl Lookahead {
    /// Builds the lookahead for a field selected by `nodes` (several when
    /// the same response key is selected more than once) returning
    /// `type_name`.
    pub(crate) fn build<'q>(
        schema: &Schema,
        document: &'q ast::Document,
        variables: Variables<'q>,
        type_name: &str,
        nodes: &[&'q ast::Field],
    ) -> Self {
        let Some(first) = nodes.first() else {
            return Self::default();
        };
        let mut builder = Builder {
            schema,
            document,
            variables,
            visiting: Vec::new(),
        };
        builder.field(type_name, nodes, first)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The response key: the alias, or the field name.
    pub fn response_key(&self) -> &str {
        self.alias().unwrap_or(&self.name)
    }

    pub fn argument(&self, name: &str) -> Option<&Json> {
        self.arguments.get(name)
    }

    pub fn selections(&self) -> &[Lookahead] {
        &self.selections
    }

    /// True if a field named `name` is selected directly below this one.
    pub fn selects(&self, name: &str) -> bool {
        self.selection(name).is_some()
    }

    /// The first selection of the field named `name`.
    pub fn selection(&self, name: &str) -> Option<&Lookahead> {
        self.selections.iter().find(|s| s.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }
}

struct Builder<'q, 's> {
    schema: &'s Schema,
    document: &'q ast::Document,
    variables: Variables<'q>,
    visiting: Vec<&'q str>,
}

impl<'q, 's> Builder<'q, 's> {
    fn field(&mut self, type_name: &str, nodes: &[&'q ast::Field], first: &ast::Field) -> Lookahead {
        let arguments = first
            .arguments
            .iter()
            .filter_map(|arg| {
                input_from_ast(&arg.value, self.variables).map(|v| (arg.name.value.clone(), v))
            })
            .collect();

        let mut grouped: IndexMap<&'q str, Vec<&'q ast::Field>> = IndexMap::new();
        for node in nodes {
            self.collect(type_name, node.selections(), &mut grouped);
        }
        let selections = grouped
            .into_iter()
            .map(|(_, children)| {
                let child = children[0];
                let child_type = self
                    .schema
                    .field(type_name, &child.name.value)
                    .map_or_else(String::new, |def| def.ty.name().to_string());
                self.field(&child_type, &children, child)
            })
            .collect();

        Lookahead {
            name: first.name.value.clone(),
            alias: first.alias.as_ref().map(|a| a.value.clone()),
            arguments,
            selections,
        }
    }

    fn collect(
        &mut self,
        type_name: &str,
        selections: &'q [ast::Selection],
        grouped: &mut IndexMap<&'q str, Vec<&'q ast::Field>>,
    ) {
        for selection in selections {
            if !self.included(selection.directives()) {
                continue;
            }
            match selection {
                ast::Selection::Field(field) => {
                    grouped.entry(field.response_key()).or_default().push(field);
                }
                ast::Selection::InlineFragment(fragment) => {
                    let applies = fragment
                        .type_condition
                        .as_ref()
                        .map_or(true, |cond| self.overlaps(type_name, &cond.value));
                    if applies {
                        self.collect(type_name, &fragment.selection_set.selections, grouped);
                    }
                }
                ast::Selection::FragmentSpread(spread) => {
                    let name = spread.name.value.as_str();
                    let Some(fragment) = self.document.fragment(name) else {
                        continue;
                    };
                    if self.visiting.contains(&name)
                        || !self.overlaps(type_name, &fragment.type_condition.value)
                    {
                        continue;
                    }
                    self.visiting.push(name);
                    self.collect(type_name, &fragment.selection_set.selections, grouped);
                    self.visiting.pop();
                }
            }
        }
    }

    fn overlaps(&self, type_name: &str, condition: &str) -> bool {
        type_name == condition
            || self.schema.is_possible_type(condition, type_name)
            || self.schema.is_possible_type(type_name, condition)
    }

    /// Applies literal `@skip` / `@include` conditions.
    fn included(&self, directives: &[ast::Directive]) -> bool {
        directives.iter().all(|directive| {
            let condition = directive
                .arguments
                .iter()
                .find(|arg| arg.name.value == "if")
                .and_then(|arg| input_from_ast(&arg.value, self.variables));
            match (directive.name.value.as_str(), condition) {
                ("include", Some(Json::Bool(value))) => value,
                ("skip", Some(Json::Bool(value))) => !value,
                _ => true,
            }
        })
    }
}
