//! Typed registration and its type-erased view

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

use super::{
    Create, Delete, Handler, HandlerResult, Read, Reply, Update, Validate, ValidateItem,
    handler_name_of,
};
use crate::codec::{Codec, ErasedPayload};
use crate::context::CallContext;
use crate::types::Action;
use crate::{ProtocolError, Result};

type MethodFn<H> = for<'a> fn(
    &'a H,
    &'a CallContext,
    Vec<<H as Handler>::Input>,
) -> BoxFuture<'a, HandlerResult<<H as Handler>::Output>>;

type ValidateFn<H> = fn(&H, Action, &[Vec<u8>]) -> std::result::Result<(), String>;

type ValidateItemFn<H> = fn(&H, Action, &<H as Handler>::Input) -> std::result::Result<(), String>;

fn call_create<'a, H: Create>(
    handler: &'a H,
    ctx: &'a CallContext,
    items: Vec<H::Input>,
) -> BoxFuture<'a, HandlerResult<H::Output>> {
    handler.create(ctx, items)
}

fn call_read<'a, H: Read>(
    handler: &'a H,
    ctx: &'a CallContext,
    items: Vec<H::Input>,
) -> BoxFuture<'a, HandlerResult<H::Output>> {
    handler.read(ctx, items)
}

fn call_update<'a, H: Update>(
    handler: &'a H,
    ctx: &'a CallContext,
    items: Vec<H::Input>,
) -> BoxFuture<'a, HandlerResult<H::Output>> {
    handler.update(ctx, items)
}

fn call_delete<'a, H: Delete>(
    handler: &'a H,
    ctx: &'a CallContext,
    items: Vec<H::Input>,
) -> BoxFuture<'a, HandlerResult<H::Output>> {
    handler.delete(ctx, items)
}

/// A handler together with the capabilities it was registered with.
///
/// Binders such as [`create`](Registration::create) are only available when
/// `H` implements the matching trait.
///
/// ```rust
/// # use crudwire::{CallContext, Handler, HandlerResult, Read, Registration, Reply};
/// struct Catalog;
/// impl Handler for Catalog { type Input = String; type Output = String; }
///
/// #[async_trait::async_trait]
/// impl Read for Catalog {
///     async fn read(&self, _: &CallContext, names: Vec<String>) -> HandlerResult<String> {
///         Ok(Reply::Direct(names.join(",")))
///     }
/// }
///
/// let registration = Registration::new(Catalog).read().named("products");
/// assert_eq!(registration.name(), "products");
/// ```
pub struct Registration<H: Handler> {
    handler: Arc<H>,
    name: String,
    create: Option<MethodFn<H>>,
    read: Option<MethodFn<H>>,
    update: Option<MethodFn<H>>,
    delete: Option<MethodFn<H>>,
    validate: Option<ValidateFn<H>>,
    validate_item: Option<ValidateItemFn<H>>,
}

impl<H: Handler> Registration<H> {
    /// Register `handler` under a name derived from its type.
    pub fn new(handler: H) -> Self {
        Self::from_arc(Arc::new(handler))
    }

    /// Register a handler that is shared with other parts of the application.
    pub fn from_arc(handler: Arc<H>) -> Self {
        Self {
            handler,
            name: handler_name_of::<H>(),
            create: None,
            read: None,
            update: None,
            delete: None,
            validate: None,
            validate_item: None,
        }
    }

    /// Override the derived name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wrapped handler.
    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// Erase the handler type so it can sit in a registry next to others.
    pub fn boxed<C: Codec>(self) -> BoxedHandler<C> {
        Box::new(self)
    }

    fn method(&self, action: Action) -> Option<MethodFn<H>> {
        match action {
            Action::Create => self.create,
            Action::Read => self.read,
            Action::Update => self.update,
            Action::Delete => self.delete,
        }
    }

    fn bound_actions(&self) -> Vec<Action> {
        Action::ALL.into_iter().filter(|action| self.method(*action).is_some()).collect()
    }

    fn decode_items<C: Codec>(
        &self,
        codec: &C,
        action: Action,
        args: &[Vec<u8>],
    ) -> Result<Vec<H::Input>> {
        let mut items = Vec::with_capacity(args.len());
        for (index, raw) in args.iter().enumerate() {
            let item: H::Input = codec.decode(raw).map_err(|error| match error {
                ProtocolError::Decode { source, .. } => {
                    ProtocolError::decode(format!("{} argument {index}", self.name), source)
                }
                other => other,
            })?;
            if let Some(validate_item) = self.validate_item {
                validate_item(&*self.handler, action, &item).map_err(|reason| {
                    ProtocolError::validation(&self.name, format!("argument {index}: {reason}"))
                })?;
            }
            items.push(item);
        }
        Ok(items)
    }
}

impl<H: Create> Registration<H> {
    /// Route [`Action::Create`] to [`Create::create`].
    pub fn create(mut self) -> Self {
        self.create = Some(call_create::<H> as MethodFn<H>);
        self
    }
}

impl<H: Read> Registration<H> {
    /// Route [`Action::Read`] to [`Read::read`].
    pub fn read(mut self) -> Self {
        self.read = Some(call_read::<H> as MethodFn<H>);
        self
    }
}

impl<H: Update> Registration<H> {
    /// Route [`Action::Update`] to [`Update::update`].
    pub fn update(mut self) -> Self {
        self.update = Some(call_update::<H> as MethodFn<H>);
        self
    }
}

impl<H: Delete> Registration<H> {
    /// Route [`Action::Delete`] to [`Delete::delete`].
    pub fn delete(mut self) -> Self {
        self.delete = Some(call_delete::<H> as MethodFn<H>);
        self
    }
}

impl<H: Create + Read + Update + Delete> Registration<H> {
    /// Bind all four CRUD methods.
    pub fn all_crud(self) -> Self {
        self.create().read().update().delete()
    }
}

impl<H: Validate> Registration<H> {
    /// Run [`Validate::validate`] on every call before decoding.
    pub fn validated(mut self) -> Self {
        self.validate = Some(<H as Validate>::validate as ValidateFn<H>);
        self
    }
}

impl<H: ValidateItem> Registration<H> {
    /// Run [`ValidateItem::validate_item`] on every decoded argument.
    pub fn item_validated(mut self) -> Self {
        self.validate_item = Some(<H as ValidateItem>::validate_item as ValidateItemFn<H>);
        self
    }
}

impl<H: Handler> fmt::Debug for Registration<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("actions", &self.bound_actions())
            .field("validated", &self.validate.is_some())
            .field("item_validated", &self.validate_item.is_some())
            .finish()
    }
}

/// A registered handler with its types erased, as the dispatcher sees it.
#[async_trait]
pub trait BoundHandler<C: Codec>: Send + Sync {
    /// Registered name
    fn name(&self) -> &str;

    /// Actions that have a bound method.
    fn actions(&self) -> Vec<Action>;

    /// Whether `action` has a bound method.
    fn supports(&self, action: Action) -> bool;

    /// Run the full-payload validator, if one was bound.
    fn validate(&self, action: Action, args: &[Vec<u8>]) -> Result<()>;

    /// Decode `args` into fresh values, validate each one, and run the method
    /// bound to `action`.
    async fn invoke(
        &self,
        codec: &C,
        ctx: &CallContext,
        action: Action,
        args: &[Vec<u8>],
    ) -> Result<Reply<ErasedPayload<C>>>;
}

/// Owned, type-erased handler.
pub type BoxedHandler<C> = Box<dyn BoundHandler<C>>;

impl<C: Codec, H: Handler> From<Registration<H>> for BoxedHandler<C> {
    fn from(registration: Registration<H>) -> Self {
        Box::new(registration)
    }
}

#[async_trait]
impl<C: Codec, H: Handler> BoundHandler<C> for Registration<H> {
    fn name(&self) -> &str {
        &self.name
    }

    fn actions(&self) -> Vec<Action> {
        self.bound_actions()
    }

    fn supports(&self, action: Action) -> bool {
        self.method(action).is_some()
    }

    fn validate(&self, action: Action, args: &[Vec<u8>]) -> Result<()> {
        match self.validate {
            Some(validate) => validate(&*self.handler, action, args)
                .map_err(|reason| ProtocolError::validation(&self.name, reason)),
            None => Ok(()),
        }
    }

    async fn invoke(
        &self,
        codec: &C,
        ctx: &CallContext,
        action: Action,
        args: &[Vec<u8>],
    ) -> Result<Reply<ErasedPayload<C>>> {
        let method = self.method(action).ok_or_else(|| ProtocolError::NotImplemented {
            action: action.as_char(),
            handler: self.name.clone(),
        })?;

        let items = self.decode_items(codec, action, args)?;
        let reply = method(&*self.handler, ctx, items)
            .await
            .map_err(|source| ProtocolError::Handler { handler: self.name.clone(), source })?;

        Ok(reply.map(|value| Box::new(value) as ErasedPayload<C>))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Note {
        text: String,
    }

    #[derive(Default)]
    struct NoteBook {
        reads: AtomicUsize,
    }

    impl Handler for NoteBook {
        type Input = Note;
        type Output = String;
    }

    #[async_trait]
    impl Read for NoteBook {
        async fn read(&self, _ctx: &CallContext, items: Vec<Note>) -> HandlerResult<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(Reply::Direct(items.into_iter().map(|n| n.text).collect::<Vec<_>>().join("+")))
        }
    }

    #[async_trait]
    impl Delete for NoteBook {
        async fn delete(&self, _ctx: &CallContext, _items: Vec<Note>) -> HandlerResult<String> {
            anyhow::bail!("notes are permanent")
        }
    }

    impl ValidateItem for NoteBook {
        fn validate_item(&self, _action: Action, item: &Note) -> std::result::Result<(), String> {
            if item.text.is_empty() { Err("empty note".to_string()) } else { Ok(()) }
        }
    }

    fn encoded(texts: &[&str]) -> Vec<Vec<u8>> {
        texts.iter().map(|text| JsonCodec.encode(&Note { text: text.to_string() }).unwrap()).collect()
    }

    fn encode_reply(reply: Reply<ErasedPayload<JsonCodec>>) -> Vec<u8> {
        match reply {
            Reply::Direct(value) => value.encode_with(&JsonCodec).unwrap(),
            other => panic!("unexpected reply with {} outputs", other.output_count()),
        }
    }

    #[test]
    fn only_bound_actions_are_supported() {
        let registration = Registration::new(NoteBook::default()).read();
        let bound: &dyn BoundHandler<JsonCodec> = &registration;

        assert_eq!(bound.name(), "note_book");
        assert_eq!(bound.actions(), vec![Action::Read]);
        assert!(bound.supports(Action::Read));
        assert!(!bound.supports(Action::Delete));
    }

    #[tokio::test]
    async fn invoke_decodes_fresh_values_per_call() {
        let registration = Registration::new(NoteBook::default()).read();
        let ctx = CallContext::new();

        let first = BoundHandler::<JsonCodec>::invoke(
            &registration,
            &JsonCodec,
            &ctx,
            Action::Read,
            &encoded(&["a", "b"]),
        )
        .await
        .unwrap();
        let second = BoundHandler::<JsonCodec>::invoke(
            &registration,
            &JsonCodec,
            &ctx,
            Action::Read,
            &encoded(&["c"]),
        )
        .await
        .unwrap();

        assert_eq!(encode_reply(first), br#""a+b""#);
        assert_eq!(encode_reply(second), br#""c""#);
        assert_eq!(registration.handler().reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unbound_action_is_not_implemented() {
        let registration = Registration::new(NoteBook::default()).read();
        let error = BoundHandler::<JsonCodec>::invoke(
            &registration,
            &JsonCodec,
            &CallContext::new(),
            Action::Update,
            &[],
        )
        .await
        .err()
        .unwrap();

        assert!(matches!(error, ProtocolError::NotImplemented { action: 'u', .. }));
    }

    #[tokio::test]
    async fn handler_errors_keep_their_source() {
        let registration = Registration::new(NoteBook::default()).delete().named("notes");
        let error = BoundHandler::<JsonCodec>::invoke(
            &registration,
            &JsonCodec,
            &CallContext::new(),
            Action::Delete,
            &encoded(&["x"]),
        )
        .await
        .err()
        .unwrap();

        assert_eq!(error.to_string(), "handler notes failed: notes are permanent");
    }

    #[tokio::test]
    async fn item_validation_rejects_before_the_method_runs() {
        let registration = Registration::new(NoteBook::default()).read().item_validated();
        let error = BoundHandler::<JsonCodec>::invoke(
            &registration,
            &JsonCodec,
            &CallContext::new(),
            Action::Read,
            &encoded(&["ok", ""]),
        )
        .await
        .err()
        .unwrap();

        assert!(error.to_string().contains("argument 1: empty note"));
        assert_eq!(registration.handler().reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn undecodable_argument_names_its_position() {
        let registration = Registration::new(NoteBook::default()).read();
        let error = BoundHandler::<JsonCodec>::invoke(
            &registration,
            &JsonCodec,
            &CallContext::new(),
            Action::Read,
            &[b"{}".to_vec()],
        )
        .await
        .err()
        .unwrap();

        assert!(matches!(
            error,
            ProtocolError::Decode { ref context, .. } if context == "note_book argument 0"
        ));
    }

    #[test]
    fn debug_lists_bound_capabilities() {
        let registration = Registration::new(NoteBook::default()).read().delete().item_validated();
        let debug = format!("{registration:?}");
        assert!(debug.contains("note_book"));
        assert!(debug.contains("item_validated: true"));
        assert!(debug.contains("validated: false"));
    }
}
