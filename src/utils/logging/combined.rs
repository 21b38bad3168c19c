//! A layer fanning out to a runtime-built list of layers.
//!
//! The set of log outputs comes from config and is only known after startup, so the
//! subscriber holds one of these behind a reload handle and swaps it as a whole.
use std::ops::ControlFlow;

use tracing_core::{
    callsite, span,
    subscriber::{Interest, Subscriber},
    Event, Metadata,
};
use tracing_subscriber::layer::{Context, Layer as LayerTrait};

type BoxedLayer<S> = Box<dyn LayerTrait<S> + Send + Sync + 'static>;

/// Ordered list of boxed layers, each seeing every callback
pub struct Layer<S> {
    inners: Vec<BoxedLayer<S>>,
}

/// Forward a notification to every inner layer
macro_rules! fan_out {
    ($($name:ident($($arg:ident: $ty:ty),*);)+) => {
        $(
            #[inline]
            fn $name(&self, $($arg: $ty,)* ctx: Context<'_, S>) {
                for layer in self.inners.iter() {
                    layer.$name($($arg,)* ctx.clone());
                }
            }
        )+
    };
}

impl<S> LayerTrait<S> for Layer<S>
where
    S: Subscriber,
{
    fn register_callsite(&self, metadata: &'static Metadata<'static>) -> Interest {
        // stop at the first layer that is not sure, so the callsite gets re-checked
        let folded = self.inners.iter().try_fold(Interest::always(), |acc, layer| {
            if acc.is_always() {
                ControlFlow::Continue(layer.register_callsite(metadata))
            } else {
                ControlFlow::Break(acc)
            }
        });
        match folded {
            ControlFlow::Continue(interest) | ControlFlow::Break(interest) => interest,
        }
    }

    #[inline]
    fn enabled(&self, metadata: &Metadata<'_>, ctx: Context<'_, S>) -> bool {
        self.inners.iter().all(|layer| layer.enabled(metadata, ctx.clone()))
    }

    fan_out! {
        new_span(attrs: &span::Attributes<'_>, id: &span::Id);
        on_record(span: &span::Id, values: &span::Record<'_>);
        on_follows_from(span: &span::Id, follows: &span::Id);
        on_event(event: &Event<'_>);
        on_enter(id: &span::Id);
        on_exit(id: &span::Id);
        on_id_change(old: &span::Id, new: &span::Id);
    }

    #[inline]
    fn on_close(&self, id: span::Id, ctx: Context<'_, S>) {
        for layer in self.inners.iter() {
            layer.on_close(id.clone(), ctx.clone());
        }
    }
}

impl<S> Layer<S>
where
    S: Subscriber,
{
    pub fn empty() -> Self {
        Self { inners: vec![] }
    }

    pub fn add<L>(&mut self, layer: L) -> &mut Self
    where
        L: LayerTrait<S> + Send + Sync + 'static,
    {
        self.inners.push(Box::new(layer));
        callsite::rebuild_interest_cache();
        self
    }
}
