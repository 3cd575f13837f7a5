//! Effective property resolution.
//!
//! For one element, layered lowest to highest:
//!
//! 1. defaults for its type (derived entries follow their source)
//! 2. the inherited stylesheet chain (text chain over node chain)
//! 3. the element's direct props
//! 4. `set-props` from matching rules
//!
//! Rules see the element through (1)–(3), never through rule output. A
//! rule may swap the stylesheet used in (2). A broken stylesheet setup is
//! reported once and the element renders with defaults only; rule `hide`
//! still applies.

use crate::error::ConfigError;
use crate::id::{ElementId, RuleId, StylesheetId};
use crate::model::{Diagram, Element};
use crate::path::PropertyObject;
use crate::props::{DiagramProps, ElementProps};
use crate::query::QueryEvaluator;
use crate::rules::{AdvancedCache, RuleEngine, RuleOverrides, RuleStylesheet};
use crate::stylesheet::{bound_stylesheet, bound_text_stylesheet, inherited_props};
use smallvec::SmallVec;

/// Fully resolved view of one element.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveProps {
    /// Total property object.
    pub props: ElementProps,
    pub hidden: bool,
    /// Stylesheet actually used (a rule may have replaced the bound one).
    pub stylesheet: StylesheetId,
    pub text_stylesheet: Option<StylesheetId>,
    pub matched: SmallVec<[RuleId; 4]>,
    /// Set when the element fell back to defaults.
    pub error: Option<ConfigError>,
}

/// Defaults + stylesheet chain + direct props, ignoring rules.
pub fn base_props(diagram: &Diagram, element: &Element) -> Result<ElementProps, ConfigError> {
    let inherited = inherited_props(
        diagram,
        element,
        bound_stylesheet(element),
        bound_text_stylesheet(element),
    )?;
    Ok(diagram
        .defaults
        .for_type(element.element_type())
        .apply_defaults(&element.props.over(&inherited)))
}

fn defaults_only(diagram: &Diagram, element: &Element) -> ElementProps {
    diagram
        .defaults
        .for_type(element.element_type())
        .apply_defaults(&ElementProps::default())
}

/// [`base_props`], or defaults alone when the stylesheet setup is broken.
pub(crate) fn base_or_defaults(diagram: &Diagram, element: &Element) -> ElementProps {
    base_props(diagram, element).unwrap_or_else(|_| defaults_only(diagram, element))
}

/// Canvas properties with defaults filled in.
pub fn diagram_props(diagram: &Diagram) -> DiagramProps {
    diagram.defaults.diagram.apply_defaults(diagram.props())
}

fn checked(
    diagram: &Diagram,
    chosen: Option<RuleStylesheet>,
) -> Result<Option<StylesheetId>, ConfigError> {
    match chosen {
        Some(RuleStylesheet { rule, stylesheet }) if !diagram.stylesheets().contains(stylesheet) => {
            Err(ConfigError::RuleUnknownStylesheet { rule, stylesheet })
        }
        other => Ok(other.map(|c| c.stylesheet)),
    }
}

/// Resolves effective properties against one diagram state.
///
/// Advanced rule output is memoized inside the resolver, so build a new
/// one after the diagram changes.
pub struct Resolver<'a> {
    diagram: &'a Diagram,
    engine: RuleEngine<'a>,
}

impl<'a> Resolver<'a> {
    pub fn new(diagram: &'a Diagram, query: &'a dyn QueryEvaluator) -> Self {
        Self {
            diagram,
            engine: RuleEngine::new(diagram, query),
        }
    }

    /// Use advanced matches kept by a scheduler instead of evaluating.
    pub fn with_cache(mut self, cache: &'a AdvancedCache) -> Self {
        self.engine = self.engine.with_cache(cache);
        self
    }

    /// `None` for unknown ids.
    pub fn effective(&self, id: ElementId) -> Option<EffectiveProps> {
        self.diagram.lookup(id).map(|el| self.effective_element(el))
    }

    pub fn effective_element(&self, element: &Element) -> EffectiveProps {
        let (base, base_error) = match base_props(self.diagram, element) {
            Ok(base) => (base, None),
            Err(err) => (defaults_only(self.diagram, element), Some(err)),
        };
        let overrides = self.engine.resolve(element, &base);
        let result = match base_error {
            Some(err) => Err(err),
            None => self.compose(element, &overrides),
        };
        match result {
            Ok(effective) => effective,
            Err(err) => {
                self.diagram.diagnostics.report(&err);
                EffectiveProps {
                    props: defaults_only(self.diagram, element),
                    hidden: overrides.hidden,
                    stylesheet: bound_stylesheet(element),
                    text_stylesheet: bound_text_stylesheet(element),
                    matched: overrides.matched,
                    error: Some(err),
                }
            }
        }
    }

    fn compose(
        &self,
        element: &Element,
        overrides: &RuleOverrides,
    ) -> Result<EffectiveProps, ConfigError> {
        let stylesheet = checked(self.diagram, overrides.stylesheet)?
            .unwrap_or_else(|| bound_stylesheet(element));
        let text_stylesheet = match bound_text_stylesheet(element) {
            Some(bound) => Some(checked(self.diagram, overrides.text_stylesheet)?.unwrap_or(bound)),
            None => None,
        };
        let inherited = inherited_props(self.diagram, element, stylesheet, text_stylesheet)?;
        let layered = overrides.props.over(&element.props.over(&inherited));
        Ok(EffectiveProps {
            props: self
                .diagram
                .defaults
                .for_type(element.element_type())
                .apply_defaults(&layered),
            hidden: overrides.hidden,
            stylesheet,
            text_stylesheet,
            matched: overrides.matched.clone(),
            error: None,
        })
    }

    /// Whether the element is hidden by a rule or an invisible layer.
    pub fn is_hidden(&self, id: ElementId) -> bool {
        let Some(element) = self.diagram.lookup(id) else {
            return false;
        };
        if self.diagram.layer(element.layer).is_some_and(|l| !l.visible) {
            return true;
        }
        let base = base_or_defaults(self.diagram, element);
        self.engine.is_hidden(element, &base)
    }

    /// Elements that end up visible, in document order.
    pub fn visible_elements(&self) -> Vec<ElementId> {
        self.diagram
            .elements()
            .into_iter()
            .map(|el| el.id)
            .filter(|id| !self.is_hidden(*id))
            .collect()
    }
}
