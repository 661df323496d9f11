//! Element resolver with fallback chain orchestration

use std::cmp::Ordering;
use std::sync::Arc;

use action_primitives::{poll_until_in, DomPort, ElementInfo, ElementRef, ExecCtx, PollSpec};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    errors::LocatorError,
    flat::FlatDom,
    memory::AnchorMemory,
    strategies::{strategy_for, Strategy},
    types::*,
};

/// Resolves semantic targets against whatever the page currently renders.
pub struct ElementLocator {
    chain: Vec<Box<dyn Strategy>>,
    memory: Arc<AnchorMemory>,
}

impl Default for ElementLocator {
    fn default() -> Self {
        Self::new(Arc::new(AnchorMemory::default()))
    }
}

impl ElementLocator {
    pub fn new(memory: Arc<AnchorMemory>) -> Self {
        Self {
            chain: LocatorStrategy::fallback_chain()
                .into_iter()
                .filter_map(strategy_for)
                .collect(),
            memory,
        }
    }

    pub fn memory(&self) -> &Arc<AnchorMemory> {
        &self.memory
    }

    /// One pass over the page; `ElementNotFound` is retryable.
    pub async fn locate(
        &self,
        port: &dyn DomPort,
        target: &SemanticTarget,
        scope: &LocateScope,
    ) -> Result<Resolution, LocatorError> {
        let dom = FlatDom::collect(port, &scope.documents).await?;
        self.resolve_in(&dom, target, scope)
    }

    /// Bounded retries of [`Self::locate`] while the page renders.
    pub async fn locate_with_retry(
        &self,
        port: &dyn DomPort,
        ctx: &ExecCtx,
        target: &SemanticTarget,
        scope: &LocateScope,
        poll: PollSpec,
    ) -> Result<Resolution, LocatorError> {
        let last: Mutex<Option<LocatorError>> = Mutex::new(None);
        let last_ref = &last;
        let outcome = poll_until_in(ctx, poll, move || async move {
            match self.locate(port, target, scope).await {
                Ok(resolution) => Some(Ok(resolution)),
                Err(err) if err.is_retryable() => {
                    *last_ref.lock() = Some(err);
                    None
                }
                Err(err) => Some(Err(err)),
            }
        })
        .await;
        match outcome {
            Some(result) => result,
            None => Err(last.lock().take().unwrap_or_else(|| {
                LocatorError::Timeout(format!("{} not found before deadline", target.key()))
            })),
        }
    }

    /// Every candidate of the first productive strategy, best first.
    pub async fn locate_all(
        &self,
        port: &dyn DomPort,
        target: &SemanticTarget,
        scope: &LocateScope,
    ) -> Result<Vec<Candidate>, LocatorError> {
        let dom = FlatDom::collect(port, &scope.documents).await?;
        let spec = target.spec();
        let pool = actionable_pool(&dom, scope);
        for strategy in &self.chain {
            let candidates = strategy.candidates(&spec, &dom, &pool);
            if !candidates.is_empty() {
                return Ok(rank_candidates(candidates, &dom, scope.anchor.as_ref()));
            }
        }
        Ok(Vec::new())
    }

    /// Cascade over an already collected page.
    pub fn resolve_in(
        &self,
        dom: &FlatDom,
        target: &SemanticTarget,
        scope: &LocateScope,
    ) -> Result<Resolution, LocatorError> {
        let spec = target.spec();
        if spec.is_empty() {
            return Err(LocatorError::InvalidTarget(target.key()));
        }
        let key = target.key();
        let pool = actionable_pool(dom, scope);

        if let Some(candidate) = self.memory.recall(&key, &pool) {
            let fits = dom
                .get(&candidate.element)
                .map_or(false, |info| spec.kind.accepts(info));
            if fits {
                debug!(target_key = %key, element = %candidate.element, "resolved from remembered anchor");
                return self.finish(dom, &key, candidate, 1);
            }
        }

        for strategy in &self.chain {
            debug!(target_key = %key, strategy = strategy.name(), "Trying strategy");
            let candidates = strategy.candidates(&spec, dom, &pool);
            if candidates.is_empty() {
                continue;
            }
            let count = candidates.len();
            let ranked = rank_candidates(candidates, dom, scope.anchor.as_ref());
            let high = ranked.iter().filter(|c| c.is_high_confidence()).count();
            if high > 1 {
                warn!(target_key = %key, high, "Ambiguous match; taking best ranked candidate");
            }
            if let Some(best) = ranked.into_iter().next() {
                info!(
                    target_key = %key,
                    strategy = strategy.name(),
                    element = %best.element,
                    confidence = best.confidence,
                    "Resolved element"
                );
                return self.finish(dom, &key, best, count);
            }
        }

        Err(LocatorError::ElementNotFound(format!(
            "All strategies exhausted for target: {}",
            key
        )))
    }

    fn finish(
        &self,
        dom: &FlatDom,
        key: &str,
        candidate: Candidate,
        candidate_count: usize,
    ) -> Result<Resolution, LocatorError> {
        let info = dom
            .get(&candidate.element)
            .cloned()
            .ok_or_else(|| LocatorError::ElementNotFound(candidate.element.to_string()))?;
        self.memory.remember(key, &info);
        Ok(Resolution {
            element: candidate.element,
            info,
            strategy: candidate.strategy,
            confidence: candidate.confidence,
            candidate_count,
        })
    }
}

/// Visible, enabled elements inside the scope.
fn actionable_pool<'a>(dom: &'a FlatDom, scope: &LocateScope) -> Vec<&'a ElementInfo> {
    dom.elements()
        .iter()
        .filter(|info| info.is_actionable())
        .filter(|info| match &scope.within {
            Some(root) => dom.is_descendant(&info.element, root),
            None => true,
        })
        .collect()
}

/// Orders candidates: confidence, then proximity to the anchor, then ancestor
/// distance, then document order.
pub fn rank_candidates(
    mut candidates: Vec<Candidate>,
    dom: &FlatDom,
    anchor: Option<&ElementRef>,
) -> Vec<Candidate> {
    let anchor_rect = anchor.and_then(|a| dom.get(a)).map(|info| info.rect);
    let proximity = |c: &Candidate| -> f64 {
        match (anchor_rect, dom.get(&c.element)) {
            (Some(anchor), Some(info)) => info.rect.distance_to(&anchor),
            _ => 0.0,
        }
    };
    let ancestry = |c: &Candidate| -> usize {
        match anchor {
            Some(anchor) => dom.tree_distance(&c.element, anchor).unwrap_or(usize::MAX),
            None => dom.depth(&c.element),
        }
    };
    candidates.sort_by(|a, b| {
        let conf = |c: &Candidate| (c.confidence * 100.0).round() as i64;
        conf(b)
            .cmp(&conf(a))
            .then_with(|| proximity(a).partial_cmp(&proximity(b)).unwrap_or(Ordering::Equal))
            .then_with(|| ancestry(a).cmp(&ancestry(b)))
            .then_with(|| a.metadata.flat_index.cmp(&b.metadata.flat_index))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::snapshot::{NodeSnapshot, SnapshotDocument};
    use action_primitives::Rect;
    use listing_core_types::ContextRoute;
    use std::time::Duration;

    fn page(root: NodeSnapshot) -> SnapshotDocument {
        SnapshotDocument::single("https://shop.test/sell", root)
    }

    fn id_of(page: &SnapshotDocument, el: &ElementRef) -> String {
        page.with_state(|s| s.attr(el, "id")).unwrap_or_default()
    }

    #[tokio::test]
    async fn first_productive_strategy_wins() {
        let page = page(NodeSnapshot::new("body").children([
            NodeSnapshot::new("input").id("by-placeholder").attr("placeholder", "Title"),
            NodeSnapshot::new("input").id("by-aria").attr("aria-label", "Item title"),
        ]));
        let locator = ElementLocator::default();
        let found = locator
            .locate(&page, &SemanticTarget::TitleInput, &LocateScope::all())
            .await
            .unwrap();
        assert_eq!(found.strategy, LocatorStrategy::AriaLabel);
        assert_eq!(id_of(&page, &found.element), "by-aria");
    }

    #[tokio::test]
    async fn hidden_and_disabled_candidates_do_not_count() {
        let page = page(NodeSnapshot::new("body").children([
            NodeSnapshot::new("input").id("hidden-title").attr("name", "title").hidden(),
            NodeSnapshot::new("input").id("disabled-title").attr("name", "title").attr("disabled", ""),
            NodeSnapshot::new("input").id("real").attr("maxlength", "80"),
        ]));
        let found = ElementLocator::default()
            .locate(&page, &SemanticTarget::TitleInput, &LocateScope::all())
            .await
            .unwrap();
        assert_eq!(found.strategy, LocatorStrategy::Structural);
        assert_eq!(id_of(&page, &found.element), "real");
    }

    #[tokio::test]
    async fn ties_go_to_the_candidate_nearest_the_anchor() {
        let page = page(NodeSnapshot::new("body").children([
            NodeSnapshot::new("input").id("far").attr("name", "price").rect(Rect::new(0.0, 900.0, 100.0, 20.0)),
            NodeSnapshot::new("h2").id("section").text("Pricing").rect(Rect::new(0.0, 400.0, 100.0, 20.0)),
            NodeSnapshot::new("input").id("near").attr("name", "price").rect(Rect::new(0.0, 430.0, 100.0, 20.0)),
        ]));
        let anchor = page.with_state(|s| s.find("section")).unwrap();
        let found = ElementLocator::default()
            .locate(&page, &SemanticTarget::PriceInput, &LocateScope::all().near(anchor))
            .await
            .unwrap();
        assert_eq!(id_of(&page, &found.element), "near");
    }

    #[tokio::test]
    async fn equal_candidates_fall_back_to_document_order() {
        let page = page(NodeSnapshot::new("body").children([
            NodeSnapshot::new("input").id("first").attr("name", "quantity"),
            NodeSnapshot::new("input").id("second").attr("name", "quantity"),
        ]));
        let found = ElementLocator::default()
            .locate(&page, &SemanticTarget::QuantityInput, &LocateScope::all())
            .await
            .unwrap();
        assert_eq!(id_of(&page, &found.element), "first");
    }

    #[tokio::test]
    async fn remembered_anchor_survives_attribute_drift() {
        let page = page(NodeSnapshot::new("body").child(
            NodeSnapshot::new("input")
                .id("t1")
                .attr("name", "title")
                .attr("aria-label", "Title"),
        ));
        let locator = ElementLocator::default();
        locator
            .locate(&page, &SemanticTarget::TitleInput, &LocateScope::all())
            .await
            .unwrap();
        let el = page.with_state(|s| s.find("t1")).unwrap();
        page.with_state(|s| s.set_attr(&el, "name", "x-9f2"));

        let again = locator
            .locate(&page, &SemanticTarget::TitleInput, &LocateScope::all())
            .await
            .unwrap();
        assert_eq!(again.strategy, LocatorStrategy::Remembered);
        assert_eq!(again.element, el);
        let entry = locator.memory().entry("title").unwrap();
        assert_eq!(entry.signature.name.as_deref(), Some("x-9f2"));
    }

    #[tokio::test]
    async fn not_found_is_retryable() {
        let page = page(NodeSnapshot::new("body"));
        let err = ElementLocator::default()
            .locate(&page, &SemanticTarget::TitleInput, &LocateScope::all())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_picks_up_late_render() {
        let page = page(NodeSnapshot::new("body").id("root"));
        let late = page.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            late.with_state(|s| {
                let root = s.find("root").unwrap();
                s.append_child(&root, NodeSnapshot::new("input").attr("name", "title"));
            });
        });
        let ctx = ExecCtx::with_budget(ContextRoute::top("https://shop.test/sell"), Duration::from_secs(30));
        let found = ElementLocator::default()
            .locate_with_retry(
                &page,
                &ctx,
                &SemanticTarget::TitleInput,
                &LocateScope::all(),
                PollSpec::new(100, 10),
            )
            .await
            .unwrap();
        assert_eq!(found.strategy, LocatorStrategy::Attribute);
    }
}
