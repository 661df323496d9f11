//! What field strategies see of a running fill, plus the strategies that
//! need more than the DOM: structured remote writes and button clicks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use action_flow::{Committed, FieldStrategy, FillError, FormSurface};
use action_locator::{ElementLocator, LocatorError, SemanticTarget};
use action_primitives::{click_when_enabled, poll_until_in, CommitTempo, DomPort, ElementRef, ExecCtx, PollSpec};
use async_trait::async_trait;
use draft_remote::{RemoteError, RemoteField, RemoteFieldWriter, WriteOutcome};
use listing_core_types::DraftId;
use listing_model::CommitMethod;
use tracing::{debug, info};

/// A form surface that may also reach the remote draft record.
pub trait DraftSurface: FormSurface {
    fn remote(&self) -> Option<&RemoteFieldWriter>;

    fn draft_id(&self) -> Option<&DraftId>;

    fn can_write_remote(&self) -> bool {
        self.remote().is_some() && self.draft_id().is_some()
    }
}

/// Borrowed view of the engine for one run.
pub struct FillSurface<'a> {
    pub port: &'a dyn DomPort,
    pub locator: &'a ElementLocator,
    pub exec: &'a ExecCtx,
    pub tempo: &'a CommitTempo,
    pub locate_poll: PollSpec,
    pub remote: Option<&'a RemoteFieldWriter>,
    pub draft_id: Option<&'a DraftId>,
}

impl FormSurface for FillSurface<'_> {
    fn port(&self) -> &dyn DomPort {
        self.port
    }

    fn locator(&self) -> &ElementLocator {
        self.locator
    }

    fn exec(&self) -> &ExecCtx {
        self.exec
    }

    fn tempo(&self) -> &CommitTempo {
        self.tempo
    }

    fn locate_poll(&self) -> PollSpec {
        self.locate_poll
    }
}

impl DraftSurface for FillSurface<'_> {
    fn remote(&self) -> Option<&RemoteFieldWriter> {
        self.remote
    }

    fn draft_id(&self) -> Option<&DraftId> {
        self.draft_id
    }
}

/// Structured write of one field through the draft API.
pub struct RemoteWrite {
    name: String,
    field: RemoteField,
}

impl RemoteWrite {
    pub fn new(field: RemoteField) -> Self {
        Self {
            name: format!("remote:{}", field.name()),
            field,
        }
    }
}

fn remote_failure(err: RemoteError) -> FillError {
    FillError::RemoteWriteFailed(err.to_string())
}

#[async_trait]
impl<C: DraftSurface + ?Sized> FieldStrategy<C> for RemoteWrite {
    fn name(&self) -> &str {
        &self.name
    }

    fn method(&self) -> CommitMethod {
        CommitMethod::RemoteWrite
    }

    async fn attempt(&self, ctx: &C) -> Result<Committed, FillError> {
        let (Some(writer), Some(id)) = (ctx.remote(), ctx.draft_id()) else {
            return Err(FillError::RemoteWriteFailed("no remote draft to write to".into()));
        };
        match writer.write(id, &self.field).await.map_err(remote_failure)? {
            WriteOutcome::AlreadyPresent { key } => Ok(Committed::with_detail(format!("{key} already held the value"))),
            WriteOutcome::Written { key, shapes_tried } => {
                Ok(Committed::with_detail(format!("{key} written after {shapes_tried} shape(s)")))
            }
        }
    }
}

/// Locates a button and clicks it once it is enabled.
pub struct ClickTarget {
    name: String,
    target: SemanticTarget,
    enable_poll: PollSpec,
}

impl ClickTarget {
    pub fn new(target: SemanticTarget, enable_poll: PollSpec) -> Self {
        Self {
            name: format!("dom:click:{}", target.key()),
            target,
            enable_poll,
        }
    }
}

#[async_trait]
impl<C: FormSurface + ?Sized> FieldStrategy<C> for ClickTarget {
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
        click_when_enabled(ctx.port(), ctx.exec(), &resolution.element, self.enable_poll).await?;
        Ok(Committed::with_detail(format!("clicked {}", resolution.element)))
    }
}

/// Where the one submit click landed.
struct SubmitClick {
    url: String,
    element: ElementRef,
}

/// Clicks the submit control at most once per run.
///
/// Later attempts only re-read the page. Navigation away from the form, the
/// submit control turning disabled or the control disappearing counts as
/// accepted.
pub struct SubmitListing {
    clicked: Arc<AtomicBool>,
    first: OnceLock<SubmitClick>,
    reaction_poll: PollSpec,
}

impl SubmitListing {
    pub fn new(clicked: Arc<AtomicBool>, reaction_poll: PollSpec) -> Self {
        Self {
            clicked,
            first: OnceLock::new(),
            reaction_poll,
        }
    }
}

#[async_trait]
impl<C: FormSurface + ?Sized> FieldStrategy<C> for SubmitListing {
    fn name(&self) -> &str {
        "dom:submit"
    }

    fn method(&self) -> CommitMethod {
        CommitMethod::Dom
    }

    async fn attempt(&self, ctx: &C) -> Result<Committed, FillError> {
        let port = ctx.port();

        if !self.clicked.load(Ordering::SeqCst) {
            let url = port.location().await?;
            let resolution = ctx
                .locator()
                .locate_with_retry(port, ctx.exec(), &SemanticTarget::SubmitButton, &ctx.scope(), ctx.locate_poll())
                .await?;
            click_when_enabled(port, ctx.exec(), &resolution.element, ctx.locate_poll()).await?;
            let _ = self.first.set(SubmitClick {
                url,
                element: resolution.element.clone(),
            });
            self.clicked.store(true, Ordering::SeqCst);
            info!(action_id = %ctx.exec().action_id, element = %resolution.element, "submit clicked");
        } else {
            debug!(action_id = %ctx.exec().action_id, "submit already clicked; re-reading page");
        }
        let Some(first) = self.first.get() else {
            return Err(FillError::Internal("submit click was not recorded".into()));
        };

        let locator = ctx.locator();
        let scope = ctx.scope();
        let scope = &scope;
        let reacted = poll_until_in(ctx.exec(), self.reaction_poll, move || async move {
            if port.location().await.ok()? != first.url {
                return Some("page navigated");
            }
            if let Ok(info) = port.element(&first.element).await {
                if info.visible && !info.enabled {
                    return Some("submit control disabled");
                }
            }
            match locator.locate(port, &SemanticTarget::SubmitButton, scope).await {
                Err(LocatorError::ElementNotFound(_)) => Some("submit control gone"),
                _ => None,
            }
        })
        .await;

        match reacted {
            Some(reaction) => Ok(Committed::with_detail(reaction)),
            None => Err(FillError::CommitUnverified("submit clicked; page did not react".into())),
        }
    }
}
