use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    ast::{Document, Node},
    context::Scopes,
    error::{SprigError, SprigResult},
    eval::{Mode, eval},
    functions::{Functions, html_escape},
    parser,
    value::Value,
};

/// A parsed template: the directive block tree plus the layout it extends.
///
/// Templates are immutable once parsed; the engine shares them between
/// concurrent renders behind an `Arc`.
pub(crate) struct Template {
    pub(crate) name: String,
    document: Document,
}

impl Template {
    pub(crate) fn parse<N: Into<String>>(name: N, source: &str) -> SprigResult<Self> {
        let name = name.into();
        let document = parser::parse(source).map_err(|e| e.with_template(&name))?;
        Ok(Self { name, document })
    }
}

/// The renderer's view of the engine: template lookup for extends/include,
/// the function allow-list, and the include depth cap.
pub(crate) trait TemplateProvider {
    fn template(&self, name: &str) -> SprigResult<Arc<Template>>;
    fn functions(&self) -> &Functions;
    fn include_limit(&self) -> usize;
}

/// Per-render state shared along an extends chain: sections collected
/// bottom-up, and the include/extends nesting depth.
struct RenderState {
    sections: HashMap<String, String>,
    depth: usize,
}

/// Renders a template, following its extends chain. The literal output of an
/// extending template is discarded; only its sections survive into the
/// parent.
pub(crate) fn render_template<P: TemplateProvider>(
    provider: &P,
    template: &Template,
    scopes: &mut Scopes<'_>,
) -> SprigResult<String> {
    let mut state = RenderState {
        sections: HashMap::new(),
        depth: 0,
    };
    render_with_state(provider, template, scopes, &mut state)
}

fn render_with_state<P: TemplateProvider>(
    provider: &P,
    template: &Template,
    scopes: &mut Scopes<'_>,
    state: &mut RenderState,
) -> SprigResult<String> {
    let mut output = String::new();
    render_nodes(provider, template, &template.document.nodes, scopes, state, &mut output)?;

    if let Some(parent_name) = &template.document.extends {
        // Extends hops count against the include limit so that cyclic
        // layouts terminate with RecursionLimit instead of looping.
        state.depth += 1;
        if state.depth > provider.include_limit() {
            return Err(SprigError::RecursionLimit {
                template_name: template.name.clone(),
                limit: provider.include_limit(),
            });
        }
        let parent = provider.template(parent_name)?;
        return render_with_state(provider, &parent, scopes, state);
    }

    Ok(output)
}

fn render_nodes<P: TemplateProvider>(
    provider: &P,
    template: &Template,
    nodes: &[Node],
    scopes: &mut Scopes<'_>,
    state: &mut RenderState,
    output: &mut String,
) -> SprigResult<()> {
    for node in nodes {
        render_node(provider, template, node, scopes, state, output)
            .map_err(|e| e.with_template(&template.name))?;
    }
    Ok(())
}

fn render_node<P: TemplateProvider>(
    provider: &P,
    template: &Template,
    node: &Node,
    scopes: &mut Scopes<'_>,
    state: &mut RenderState,
    output: &mut String,
) -> SprigResult<()> {
    match node {
        Node::Text(text) => {
            output.push_str(text);
        }

        Node::Interpolation { expr, raw } => {
            let value = eval(expr, scopes, provider.functions(), Mode::Lenient)?;
            let Some(rendered) = value.render() else {
                return Err(SprigError::render(format!(
                    "cannot render a {} directly; use json()",
                    value.type_name()
                )));
            };
            if *raw {
                output.push_str(&rendered);
            } else {
                output.push_str(&html_escape(&rendered));
            }
        }

        Node::If { arms, fallback } => {
            // Only the first truthy arm's body is rendered; the bodies of
            // skipped arms are never evaluated at all.
            for arm in arms {
                let taken =
                    eval(&arm.condition, scopes, provider.functions(), Mode::Lenient)?.is_truthy();
                if taken {
                    return render_nodes(provider, template, &arm.body, scopes, state, output);
                }
            }
            if let Some(body) = fallback {
                render_nodes(provider, template, body, scopes, state, output)?;
            }
        }

        Node::Foreach {
            iterable,
            key_var,
            value_var,
            body,
        } => {
            let collection = eval(iterable, scopes, provider.functions(), Mode::Strict)?;
            match collection {
                Value::Sequence(items) => {
                    for (index, item) in items.into_iter().enumerate() {
                        scopes.push();
                        if let Some(key_var) = key_var {
                            let index = i64::try_from(index).unwrap_or(i64::MAX);
                            scopes.bind(key_var.clone(), Value::Int(index));
                        }
                        scopes.bind(value_var.clone(), item);
                        let result =
                            render_nodes(provider, template, body, scopes, state, output);
                        scopes.pop();
                        result?;
                    }
                }
                Value::Mapping(pairs) => {
                    for (key, item) in pairs {
                        scopes.push();
                        if let Some(key_var) = key_var {
                            scopes.bind(key_var.clone(), Value::String(key));
                        }
                        scopes.bind(value_var.clone(), item);
                        let result =
                            render_nodes(provider, template, body, scopes, state, output);
                        scopes.pop();
                        result?;
                    }
                }
                other => {
                    return Err(SprigError::render(format!(
                        "cannot iterate a {}",
                        other.type_name()
                    )));
                }
            }
        }

        Node::Section { name, body } => {
            let mut rendered = String::new();
            render_nodes(provider, template, body, scopes, state, &mut rendered)?;
            // First definition wins: the deepest child in an extends chain
            // renders first, so its section shadows the parent's.
            state.sections.entry(name.clone()).or_insert(rendered);
        }

        Node::Yield { name, default } => {
            if let Some(content) = state.sections.get(name) {
                output.push_str(content);
            } else if let Some(default) = default {
                let value = eval(default, scopes, provider.functions(), Mode::Lenient)?;
                let Some(rendered) = value.render() else {
                    return Err(SprigError::render(format!(
                        "cannot render a {} as a yield default",
                        value.type_name()
                    )));
                };
                output.push_str(&html_escape(&rendered));
            }
        }

        Node::Include { name, bindings } => {
            if state.depth + 1 > provider.include_limit() {
                return Err(SprigError::RecursionLimit {
                    template_name: name.clone(),
                    limit: provider.include_limit(),
                });
            }

            // Bindings are evaluated in the including template's scope
            // before the child scope exists.
            let mut bound = Vec::with_capacity(bindings.len());
            for (key, expr) in bindings {
                bound.push((
                    key.clone(),
                    eval(expr, scopes, provider.functions(), Mode::Lenient)?,
                ));
            }

            let included = provider.template(name)?;
            scopes.push();
            for (key, value) in bound {
                scopes.bind(key, value);
            }
            // The include gets a fresh section map so its own layout
            // composition cannot clobber the including page's sections.
            let mut inner_state = RenderState {
                sections: HashMap::new(),
                depth: state.depth + 1,
            };
            let result = render_with_state(provider, &included, scopes, &mut inner_state);
            scopes.pop();
            output.push_str(&result?);
        }
    }

    Ok(())
}
