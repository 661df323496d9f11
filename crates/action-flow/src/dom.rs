//! DOM-side field strategies: locate a control, then commit through it.

use action_locator::{ElementLocator, LocateScope, SemanticTarget};
use action_primitives::{
    commit_value, upload_files, CommitMode, CommitTempo, DomPort, ExecCtx, FilePayload, PollSpec,
};
use async_trait::async_trait;
use listing_model::CommitMethod;
use tracing::debug;

use crate::chain::{Committed, FieldStrategy};
use crate::errors::FillError;

/// What DOM strategies need from the running fill.
pub trait FormSurface: Send + Sync {
    fn port(&self) -> &dyn DomPort;

    fn locator(&self) -> &ElementLocator;

    fn exec(&self) -> &ExecCtx;

    fn tempo(&self) -> &CommitTempo;

    /// Bounded wait for a control to render.
    fn locate_poll(&self) -> PollSpec;

    fn scope(&self) -> LocateScope {
        LocateScope::all()
    }
}

/// Locates `target` and runs the full commit sequence with `value`.
pub struct LocateAndCommit {
    name: String,
    target: SemanticTarget,
    value: String,
    mode: CommitMode,
}

impl LocateAndCommit {
    pub fn new(target: SemanticTarget, value: impl Into<String>) -> Self {
        Self {
            name: format!("dom:{}", target.key()),
            target,
            value: value.into(),
            mode: CommitMode::Plain,
        }
    }

    pub fn typeahead(mut self) -> Self {
        self.mode = CommitMode::Typeahead;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl<C: FormSurface + ?Sized> FieldStrategy<C> for LocateAndCommit {
    fn name(&self) -> &str {
        &self.name
    }

    fn method(&self) -> CommitMethod {
        CommitMethod::Dom
    }

    async fn attempt(&self, ctx: &C) -> Result<Committed, FillError> {
        let resolution = ctx
            .locator()
            .locate_with_retry(ctx.port(), ctx.exec(), &self.target, &ctx.scope(), ctx.locate_poll())
            .await?;
        debug!(
            target_key = %self.target.key(),
            element = %resolution.element,
            strategy = resolution.strategy.name(),
            "control located"
        );
        let outcome = commit_value(
            ctx.port(),
            ctx.exec(),
            &resolution.element,
            &self.value,
            self.mode,
            ctx.tempo(),
        )
        .await;
        if outcome.committed {
            Ok(Committed::with_detail(format!(
                "{} via {}",
                resolution.element,
                resolution.strategy.name()
            )))
        } else {
            let detail = outcome.failure_detail().unwrap_or_else(|| {
                format!(
                    "page reports {:?} after commit",
                    outcome.observed.as_deref().unwrap_or("")
                )
            });
            Err(FillError::CommitUnverified(detail))
        }
    }
}

/// Locates a file input and attaches every payload.
pub struct LocateAndUpload {
    target: SemanticTarget,
    files: Vec<FilePayload>,
}

impl LocateAndUpload {
    pub fn new(target: SemanticTarget, files: Vec<FilePayload>) -> Self {
        Self { target, files }
    }
}

#[async_trait]
impl<C: FormSurface + ?Sized> FieldStrategy<C> for LocateAndUpload {
    fn name(&self) -> &str {
        "dom:upload"
    }

    fn method(&self) -> CommitMethod {
        CommitMethod::Dom
    }

    async fn attempt(&self, ctx: &C) -> Result<Committed, FillError> {
        if self.files.is_empty() {
            return Err(FillError::NotFound("no files to upload".into()));
        }
        let resolution = ctx
            .locator()
            .locate_with_retry(ctx.port(), ctx.exec(), &self.target, &ctx.scope(), ctx.locate_poll())
            .await?;
        let accepted = upload_files(ctx.port(), ctx.exec(), &resolution.element, &self.files).await?;
        if accepted == self.files.len() {
            Ok(Committed::with_detail(format!("{accepted} files")))
        } else {
            Err(FillError::CommitUnverified(format!(
                "input accepted {accepted} of {} files",
                self.files.len()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::FallbackChain;
    use action_primitives::snapshot::{NodeSnapshot, SnapshotDocument};
    use listing_core_types::ContextRoute;
    use std::time::Duration;

    struct Surface {
        page: SnapshotDocument,
        locator: ElementLocator,
        exec: ExecCtx,
        tempo: CommitTempo,
    }

    impl FormSurface for Surface {
        fn port(&self) -> &dyn DomPort {
            &self.page
        }
        fn locator(&self) -> &ElementLocator {
            &self.locator
        }
        fn exec(&self) -> &ExecCtx {
            &self.exec
        }
        fn tempo(&self) -> &CommitTempo {
            &self.tempo
        }
        fn locate_poll(&self) -> PollSpec {
            PollSpec::new(0, 2)
        }
    }

    fn surface(root: NodeSnapshot) -> Surface {
        Surface {
            page: SnapshotDocument::single("https://shop.test/sell", root),
            locator: ElementLocator::default(),
            exec: ExecCtx::with_budget(ContextRoute::top("https://shop.test/sell"), Duration::from_secs(10)),
            tempo: CommitTempo::immediate(),
        }
    }

    #[tokio::test]
    async fn commits_into_managed_title() {
        let surface = surface(NodeSnapshot::new("body").children([
            NodeSnapshot::new("label").attr("for", "t").text("Title"),
            NodeSnapshot::new("input").id("t").attr("name", "title").managed(),
        ]));
        let chain = FallbackChain::<Surface>::new("title").then(LocateAndCommit::new(SemanticTarget::TitleInput, "Blue Mug"));
        let outcome = chain.run(&surface.exec.clone(), &surface).await;
        assert!(outcome.committed, "{:?}", outcome.attempts);
        let model = surface.page.with_state(|state| {
            let el = state.find("t").unwrap();
            state.model_value(&el)
        });
        assert_eq!(model.as_deref(), Some("Blue Mug"));
    }

    #[tokio::test]
    async fn missing_control_is_not_found() {
        let surface = surface(NodeSnapshot::new("body").child(NodeSnapshot::new("p").text("Loading")));
        let strategy = LocateAndCommit::new(SemanticTarget::PriceInput, "9.99");
        let err = FieldStrategy::<Surface>::attempt(&strategy, &surface).await.unwrap_err();
        assert!(matches!(err, FillError::NotFound(_) | FillError::Timeout(_)));
    }

    #[tokio::test]
    async fn uploads_all_files() {
        let surface = surface(NodeSnapshot::new("body").child(
            NodeSnapshot::new("input").attr("type", "file").attr("name", "photos").attr("multiple", ""),
        ));
        let strategy = LocateAndUpload::new(
            SemanticTarget::PhotoInput,
            vec![FilePayload::url("https://img.test/a.jpg"), FilePayload::url("https://img.test/b.jpg")],
        );
        let done = FieldStrategy::<Surface>::attempt(&strategy, &surface).await.unwrap();
        assert_eq!(done.detail.as_deref(), Some("2 files"));
    }
}
