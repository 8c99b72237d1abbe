use crate::model::{User, UserForm};
use crate::resources::UsersResource;
use crate::services::{UserError, UserService};
use parking_lot::Mutex;
use resource_framework::{
    CachedMapResource, ContextCreator, ExecutionContext, ExecutorInterrupter, HandlerId,
    ResourceKey, SyncExecutor,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Result of a pipeline run, as recorded by the pipeline's post-handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Accepted,
    /// Validation failed with these messages.
    Rejected(Vec<String>),
    /// A handler failed.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitAttempt {
    pub form: UserForm,
    pub outcome: AttemptOutcome,
}

/// Value returned by [`FormPipeline::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted(User),
    Rejected(Vec<String>),
}

/// A submitted user and the cached value it replaced.
#[derive(Debug, Clone)]
struct Staged {
    user: User,
    previous: Option<User>,
}

/// Validate → format → submit, built from three linked executors.
///
/// `validate` runs before `format`, which runs before `submit`, so executing
/// `submit` drives the whole chain. Validators record their messages; a
/// post-handler on `validate` interrupts the run if any were recorded, which
/// skips `format` and `submit` handlers but still runs post-handlers.
///
/// | Stage | Handlers | Post-handlers |
/// |-------|----------|---------------|
/// | `validate` | validators | interrupt on errors, record a failed attempt |
/// | `format` | store the normalized form | record a failed attempt |
/// | `submit` | write the user to the cache | undo the write on error, record the attempt (`on_submit`) |
pub struct FormPipeline {
    pub validate: SyncExecutor<UserForm>,
    pub format: SyncExecutor<UserForm>,
    pub submit: SyncExecutor<UserForm>,
    users: Arc<CachedMapResource<UsersResource>>,
    service: Arc<dyn UserService>,
    errors: ContextCreator<Mutex<Vec<String>>>,
    formatted: ContextCreator<Mutex<Option<UserForm>>>,
    staged: ContextCreator<Mutex<Option<Staged>>>,
    attempts: Arc<Mutex<Vec<SubmitAttempt>>>,
}

impl FormPipeline {
    /// Creates the pipeline with the default validators.
    pub fn new(users: Arc<CachedMapResource<UsersResource>>, service: Arc<dyn UserService>) -> Self {
        let pipeline = Self {
            validate: SyncExecutor::new(),
            format: SyncExecutor::new(),
            submit: SyncExecutor::new(),
            users,
            service,
            errors: ContextCreator::new(|_| Mutex::new(Vec::new())),
            formatted: ContextCreator::new(|_| Mutex::new(None)),
            staged: ContextCreator::new(|_| Mutex::new(None)),
            attempts: Arc::new(Mutex::new(Vec::new())),
        };
        pipeline.format.before(&pipeline.validate);
        pipeline.submit.before(&pipeline.format);

        pipeline.add_validator(|form| {
            if form.id.is_valid() {
                Ok(())
            } else {
                Err(format!("Invalid id {}", form.id.0))
            }
        });
        pipeline.add_validator(|form| {
            if form.name.trim().is_empty() {
                Err("Name is required".to_string())
            } else {
                Ok(())
            }
        });
        pipeline.add_validator(|form| {
            let email = form.email.trim();
            match email.split_once('@') {
                Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
                _ => Err(format!("Invalid email {email:?}")),
            }
        });
        pipeline.wire();
        pipeline
    }

    /// Adds a validator. Every validator runs; any message interrupts the submission.
    pub fn add_validator<F>(&self, validator: F) -> HandlerId
    where
        F: Fn(&UserForm) -> Result<(), String> + Send + Sync + 'static,
    {
        let errors = self.errors.clone();
        self.validate.add_handler(move |form, ctx| {
            if let Err(message) = validator(form) {
                debug!(message = %message, "Validation failed");
                ctx.get_context(&errors).lock().push(message);
            }
            Ok(())
        })
    }

    /// Every pipeline run so far, in order.
    pub fn attempts(&self) -> Vec<SubmitAttempt> {
        self.attempts.lock().clone()
    }

    /// Runs the chain for `form` and persists the accepted user.
    ///
    /// The cache is updated by the `submit` stage; if the service then refuses
    /// the save, the cached entry is restored and the service error returned.
    #[instrument(skip_all, fields(id = %form.id))]
    pub async fn submit(&self, form: UserForm) -> Result<SubmitOutcome, UserError> {
        let ctx = self.submit.execute(form)?;

        if ExecutorInterrupter::is_interrupted(&ctx) {
            let errors = ctx.get_context(&self.errors).lock().clone();
            warn!(?errors, "Form rejected");
            return Ok(SubmitOutcome::Rejected(errors));
        }
        let staged = ctx.get_context(&self.staged).lock().take();
        let Some(Staged { user, previous }) = staged else {
            return Err(UserError::ValidationError("Nothing was submitted".to_string()));
        };

        if let Err(error) = self.service.save_user(user.clone()).await {
            warn!(error = %error, "Save failed, restoring cache");
            match previous {
                Some(previous) => self.users.set(previous.id, previous)?,
                None => self.users.delete(&ResourceKey::flat(user.id))?,
            }
            return Err(error);
        }
        info!("User submitted");
        Ok(SubmitOutcome::Submitted(user))
    }

    fn wire(&self) {
        let errors = self.errors.clone();
        self.validate.add_post_handler(move |_, ctx| {
            if !ctx.get_context(&errors).lock().is_empty() {
                ExecutorInterrupter::interrupt(ctx);
            }
            Ok(())
        });

        // A failure here ends the run before `submit` post-handlers get to it.
        for stage in [&self.validate, &self.format] {
            let attempts = self.attempts.clone();
            stage.add_post_handler(move |form, ctx| {
                if let Some(error) = ctx.exception() {
                    debug!(error = %error, "Pipeline stage failed");
                    attempts.lock().push(SubmitAttempt {
                        form: form.clone(),
                        outcome: AttemptOutcome::Failed(error.to_string()),
                    });
                }
                Ok(())
            });
        }

        let formatted = self.formatted.clone();
        self.format.add_handler(move |form, ctx| {
            *ctx.get_context(&formatted).lock() = Some(form.normalized());
            Ok(())
        });

        let formatted = self.formatted.clone();
        let staged = self.staged.clone();
        let users = self.users.clone();
        self.submit.add_handler(move |form, ctx| {
            let form = ctx
                .get_context(&formatted)
                .lock()
                .clone()
                .unwrap_or_else(|| form.normalized());
            let user = form.to_user();
            let previous = users.get(&user.id);
            users.set(user.id, user.clone())?;
            *ctx.get_context(&staged).lock() = Some(Staged { user, previous });
            Ok(())
        });

        let staged = self.staged.clone();
        let users = self.users.clone();
        self.submit.add_post_handler(move |_, ctx| {
            if ctx.exception().is_none() {
                return Ok(());
            }
            let Some(Staged { user, previous }) = ctx.get_context(&staged).lock().take() else {
                return Ok(());
            };
            debug!(id = %user.id, "Rolling back cached user");
            match previous {
                Some(previous) => users.set(previous.id, previous)?,
                None => users.delete(&ResourceKey::flat(user.id))?,
            }
            Ok(())
        });

        let errors = self.errors.clone();
        let attempts = self.attempts.clone();
        self.submit.add_post_handler(move |form, ctx| {
            let outcome = attempt_outcome(ctx, &errors);
            debug!(?outcome, "Submit attempt");
            attempts.lock().push(SubmitAttempt {
                form: form.clone(),
                outcome,
            });
            Ok(())
        });
    }
}

fn attempt_outcome(ctx: &ExecutionContext, errors: &ContextCreator<Mutex<Vec<String>>>) -> AttemptOutcome {
    if let Some(error) = ctx.exception() {
        return AttemptOutcome::Failed(error.to_string());
    }
    let errors = ctx.get_context(errors).lock().clone();
    if ExecutorInterrupter::is_interrupted(ctx) {
        AttemptOutcome::Rejected(errors)
    } else {
        AttemptOutcome::Accepted
    }
}
