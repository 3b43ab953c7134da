use std::collections::BTreeMap;

use cartwise_core::config::{AppConfig, LoadOptions};
use cartwise_core::engine::{EngineStatistics, ReasoningStep};
use cartwise_core::fixtures;
use cartwise_core::{
    Cart, CartItem, InferenceEngine, Product, RuleBase, RuleId, RuleParser, SessionId,
    ShoppingContext, UserId, UserProfile,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use super::{parse_item_spec, CommandResult, EXIT_CONFIG, EXIT_INVALID_INPUT};

const COMMAND: &str = "explain";

#[derive(Debug, Clone, Default)]
pub struct ExplainRequest {
    pub user_id: String,
    pub items: Vec<String>,
    pub rule_id: Option<String>,
    pub goal: Option<String>,
}

#[derive(Debug, Serialize)]
struct RuleExplanation {
    rule_id: RuleId,
    name: String,
    priority: i32,
    condition: Option<String>,
    steps: Vec<ReasoningStep>,
}

#[derive(Debug, Serialize)]
struct ExplainReport {
    user_id: UserId,
    mode: &'static str,
    goal: Option<String>,
    goal_reached: Option<bool>,
    fired_rules: Vec<RuleId>,
    failed_rules: Vec<RuleId>,
    variables: BTreeMap<String, Value>,
    rules: Vec<RuleExplanation>,
    statistics: EngineStatistics,
}

/// Runs the starter rules against a seed user and cart and reports, per rule,
/// what each firing changed.
pub fn run(request: &ExplainRequest) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            let message = error.to_string();
            return CommandResult::failure(COMMAND, "config_validation", message, EXIT_CONFIG);
        }
    };

    let users = fixtures::seed_users();
    let wanted = UserId::new(request.user_id.as_str());
    let Some(user) = users.iter().find(|user| user.id == wanted) else {
        return invalid(format!("unknown user `{}`", request.user_id));
    };
    let inventory = fixtures::seed_catalog();
    let cart = match build_cart(user, &inventory, &request.items) {
        Ok(cart) => cart,
        Err(message) => return invalid(message),
    };

    let mut rule_base = RuleBase::new();
    for rule in fixtures::starter_rules() {
        rule_base.add_rule(rule);
    }
    let selected: Vec<RuleId> = match &request.rule_id {
        Some(rule_id) => {
            let rule_id = RuleId::new(rule_id.as_str());
            if rule_base.get_rule(&rule_id).is_none() {
                return CommandResult::failure(
                    COMMAND,
                    "unknown_rule",
                    format!("no starter rule with id `{rule_id}`"),
                    EXIT_INVALID_INPUT,
                );
            }
            vec![rule_id]
        }
        None => rule_base.rules_by_priority().iter().map(|rule| rule.id.clone()).collect(),
    };

    let mut context = ShoppingContext::new(user, &cart, &inventory, Utc::now());
    let mut engine = InferenceEngine::from_config(&rule_base, &config.engine);

    let (mode, goal_reached, fired_rules, failed_rules) = match &request.goal {
        Some(goal) => {
            let expression = match RuleParser::parse(goal) {
                Ok(expression) => expression,
                Err(error) => {
                    return CommandResult::failure(
                        COMMAND,
                        "rule_parse",
                        format!("goal `{goal}` does not parse: {error}"),
                        EXIT_INVALID_INPUT,
                    );
                }
            };
            let result = engine.backward_chain(&expression, &mut context);
            ("backward", Some(result.success), result.chain, Vec::new())
        }
        None => {
            let result = engine.forward_chain(&mut context);
            ("forward", None, result.fired_rules, result.failed_rules)
        }
    };

    let rules = selected
        .iter()
        .filter_map(|rule_id| rule_base.get_rule(rule_id))
        .map(|rule| RuleExplanation {
            rule_id: rule.id.clone(),
            name: rule.name.clone(),
            priority: rule.priority,
            condition: rule.condition.as_ref().map(|condition| match condition.resolve() {
                Ok(expression) => expression.to_string(),
                Err(error) => format!("unparseable condition: {error}"),
            }),
            steps: engine.explain_reasoning(&rule.id),
        })
        .collect();

    let message = format!("{mode} chaining fired {} rule(s) for {}", fired_rules.len(), user.id);
    let report = ExplainReport {
        user_id: user.id.clone(),
        mode,
        goal: request.goal.clone(),
        goal_reached,
        fired_rules,
        failed_rules,
        variables: context.variables.clone(),
        rules,
        statistics: engine.statistics(),
    };
    CommandResult::success_with(COMMAND, message, report)
}

fn build_cart(
    user: &UserProfile,
    inventory: &[Product],
    items: &[String],
) -> Result<Cart, String> {
    let mut cart = Cart::new(user.id.clone(), SessionId::new("explain"));
    for spec in items {
        let (product_id, quantity) = parse_item_spec(spec)?;
        let product = inventory
            .iter()
            .find(|product| product.id == product_id)
            .ok_or_else(|| format!("unknown product `{product_id}`"))?;
        cart.add_item(
            CartItem::new(
                product.id.as_str(),
                product.name.clone(),
                product.price,
                quantity,
                product.category.clone(),
            )
            .with_tags(product.tags.clone()),
        );
    }
    Ok(cart)
}

fn invalid(message: String) -> CommandResult {
    CommandResult::failure(COMMAND, "invalid_input", message, EXIT_INVALID_INPUT)
}
