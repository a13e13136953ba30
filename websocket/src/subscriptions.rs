//! Subscription management and filter matching for downstream clients.

use std::collections::HashMap;

use push_messages::{BlockUpdate, SubscribeFilter, TxUpdate};

/// One active subscription owned by a connected client.
#[derive(Clone, Debug)]
pub struct Subscription {
    pub id: String,
    pub filters: Vec<SubscribeFilter>,
}

/// Structural validation of a subscribe request.
///
/// A wildcard must be the only filter in its subscription; value-carrying
/// filters must not be empty.
pub fn validate_filters(filters: &[SubscribeFilter]) -> Result<(), String> {
    if filters.is_empty() {
        return Err("subscription needs at least one filter".into());
    }
    let wildcards = filters.iter().filter(|f| f.is_wildcard()).count();
    if wildcards > 0 && filters.len() > 1 {
        return Err("wildcard filter cannot be combined with other filters".into());
    }
    for filter in filters {
        match filter {
            SubscribeFilter::Category(value) if value.is_empty() => {
                return Err("CATEGORY filter needs a value".into());
            }
            SubscribeFilter::From(value) if value.is_empty() => {
                return Err("FROM filter needs a value".into());
            }
            SubscribeFilter::Recipients(values) if values.is_empty() => {
                return Err("RECIPIENTS filter needs at least one address".into());
            }
            _ => {}
        }
    }
    Ok(())
}

/// Whether one filter matches one transaction.
fn filter_matches(filter: &SubscribeFilter, tx: &TxUpdate) -> bool {
    match filter {
        SubscribeFilter::Category(category) => &tx.category == category,
        SubscribeFilter::From(sender) => &tx.sender == sender,
        SubscribeFilter::Recipients(wanted) => {
            tx.recipients.iter().any(|r| wanted.contains(r))
        }
        SubscribeFilter::Wildcard => true,
    }
}

/// Filter a block against one subscription.
///
/// Returns the matching transactions and the filters that actually matched
/// at least one of them — never the subscription's full filter set — or
/// `None` when nothing matches.
pub fn match_block(
    subscription: &Subscription,
    update: &BlockUpdate,
) -> Option<(Vec<TxUpdate>, Vec<SubscribeFilter>)> {
    let mut matched_txs = Vec::new();
    let mut matched_filters: Vec<SubscribeFilter> = Vec::new();

    for tx in &update.txs {
        let mut tx_matched = false;
        for filter in &subscription.filters {
            if filter_matches(filter, tx) {
                tx_matched = true;
                if !matched_filters.contains(filter) {
                    matched_filters.push(filter.clone());
                }
            }
        }
        if tx_matched {
            matched_txs.push(tx.clone());
        }
    }

    if matched_txs.is_empty() {
        None
    } else {
        Some((matched_txs, matched_filters))
    }
}

/// The set of subscriptions owned by one client connection.
pub struct ClientSubscriptions {
    subs: HashMap<String, Subscription>,
    next_seq: u64,
}

impl ClientSubscriptions {
    pub fn new() -> Self {
        Self {
            subs: HashMap::new(),
            next_seq: 1,
        }
    }

    /// Add a subscription, rejecting duplicates of an existing filter set
    /// (order-insensitive comparison).
    pub fn subscribe(&mut self, filters: Vec<SubscribeFilter>) -> Result<&Subscription, String> {
        let duplicate = self.subs.values().any(|sub| {
            sub.filters.len() == filters.len()
                && filters.iter().all(|f| sub.filters.contains(f))
        });
        if duplicate {
            return Err("duplicate subscription".into());
        }

        let id = format!("sub-{}", self.next_seq);
        self.next_seq += 1;
        let subscription = Subscription {
            id: id.clone(),
            filters,
        };
        Ok(self.subs.entry(id).or_insert(subscription))
    }

    /// Remove a subscription by id; `false` if it did not exist.
    pub fn unsubscribe(&mut self, id: &str) -> bool {
        self.subs.remove(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.subs.values()
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }
}

impl Default for ClientSubscriptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimum-spacing rate limiter for subscribe requests on one connection.
pub struct SubscribeRateLimiter {
    min_interval_ms: u64,
    last_request_ms: Option<u64>,
}

impl SubscribeRateLimiter {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval_ms,
            last_request_ms: None,
        }
    }

    /// Record a request; `false` means the request came too soon.
    pub fn allow(&mut self, now_ms: u64) -> bool {
        match self.last_request_ms {
            Some(last) if now_ms.saturating_sub(last) < self.min_interval_ms => false,
            _ => {
                self.last_request_ms = Some(now_ms);
                true
            }
        }
    }
}
