use super::{
    Action, Condition, CustomAction, DuplicatePolicy, EventHandler, EventMap, KeySelector,
    Mapping, MissingPolicy,
};
use crate::modules::projections::core::context::ProjectionContext;
use crate::modules::projections::core::projection::Projection;
use crate::modules::projections::core::transaction::Event;
use crate::shared::core::primitives::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Fluent construction of an [`EventMap`].
///
/// ```ignore
/// let mut builder = EventMap::<ProductCatalogEntry>::builder();
/// builder
///     .map::<ProductAdded>()
///     .as_create_of(|e| e.product_key.clone())
///     .using(|entry, e, _| { entry.category = Some(e.category.clone()); Ok(()) });
/// let map = builder.build();
/// ```
pub struct EventMapBuilder<P: Projection> {
    handlers: HashMap<&'static str, Vec<Box<dyn EventHandler<P>>>>,
}

impl<P: Projection> Default for EventMapBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Projection> EventMapBuilder<P> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn map<E: Event>(&mut self) -> EventMappingBuilder<'_, P, E> {
        EventMappingBuilder {
            map: self,
            condition: None,
        }
    }

    pub fn build(self) -> EventMap<P> {
        EventMap {
            handlers: self.handlers,
        }
    }

    fn register<E: Event>(&mut self, mapping: Mapping<P, E>) -> usize {
        let handlers = self.handlers.entry(E::EVENT_TYPE).or_default();
        handlers.push(Box::new(mapping));
        handlers.len() - 1
    }

    fn replace<E: Event>(&mut self, index: usize, mapping: Mapping<P, E>) {
        if let Some(slot) = self
            .handlers
            .get_mut(E::EVENT_TYPE)
            .and_then(|handlers| handlers.get_mut(index))
        {
            *slot = Box::new(mapping);
        }
    }
}

pub struct EventMappingBuilder<'m, P: Projection, E: Event> {
    map: &'m mut EventMapBuilder<P>,
    condition: Option<Condition<E>>,
}

impl<'m, P: Projection, E: Event> EventMappingBuilder<'m, P, E> {
    /// Only applies the mapping to events matching `predicate`. Repeated
    /// calls must all hold.
    pub fn when(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        let condition: Condition<E> = match self.condition.take() {
            Some(existing) => Arc::new(move |event: &E| existing(event) && predicate(event)),
            None => Arc::new(predicate),
        };
        self.condition = Some(condition);
        self
    }

    pub fn as_create_of(
        self,
        key: impl Fn(&E) -> P::Key + Send + Sync + 'static,
    ) -> CreateMappingBuilder<'m, P, E> {
        CreateMappingBuilder {
            map: self.map,
            condition: self.condition,
            key: Arc::new(key),
            on_duplicate: DuplicatePolicy::Fail,
        }
    }

    pub fn as_update_of(
        self,
        key: impl Fn(&E) -> P::Key + Send + Sync + 'static,
    ) -> UpdateMappingBuilder<'m, P, E> {
        UpdateMappingBuilder {
            map: self.map,
            condition: self.condition,
            key: Arc::new(key),
            on_missing: MissingPolicy::Fail,
        }
    }

    /// Registers the delete right away; chain `ignoring_misses` to relax it.
    pub fn as_delete_of(
        self,
        key: impl Fn(&E) -> P::Key + Send + Sync + 'static,
    ) -> DeleteMappingBuilder<'m, P, E> {
        let key: KeySelector<P, E> = Arc::new(key);
        let index = self.map.register(Mapping {
            condition: self.condition.clone(),
            action: Action::Delete {
                key: key.clone(),
                on_missing: MissingPolicy::Fail,
            },
        });
        DeleteMappingBuilder {
            map: self.map,
            condition: self.condition,
            key,
            index,
        }
    }

    pub fn as_custom<F, Fut>(self, action: F)
    where
        F: Fn(Arc<E>, ProjectionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let action: CustomAction<E> = Arc::new(
            move |event: Arc<E>, context: ProjectionContext| -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(action(event, context))
            },
        );
        self.map.register(Mapping {
            condition: self.condition,
            action: Action::Custom(action),
        });
    }
}

pub struct CreateMappingBuilder<'m, P: Projection, E: Event> {
    map: &'m mut EventMapBuilder<P>,
    condition: Option<Condition<E>>,
    key: KeySelector<P, E>,
    on_duplicate: DuplicatePolicy,
}

impl<P: Projection, E: Event> CreateMappingBuilder<'_, P, E> {
    /// Leaves an existing projection untouched.
    pub fn ignoring_duplicates(mut self) -> Self {
        self.on_duplicate = DuplicatePolicy::Ignore;
        self
    }

    /// Applies the mutation to the existing projection.
    pub fn overwriting_duplicates(mut self) -> Self {
        self.on_duplicate = DuplicatePolicy::Overwrite;
        self
    }

    pub fn using(
        self,
        mutate: impl Fn(&mut P, &E, &ProjectionContext) -> anyhow::Result<()> + Send + Sync + 'static,
    ) {
        self.map.register(Mapping {
            condition: self.condition,
            action: Action::Create {
                key: self.key,
                mutate: Arc::new(mutate),
                on_duplicate: self.on_duplicate,
            },
        });
    }
}

pub struct UpdateMappingBuilder<'m, P: Projection, E: Event> {
    map: &'m mut EventMapBuilder<P>,
    condition: Option<Condition<E>>,
    key: KeySelector<P, E>,
    on_missing: MissingPolicy,
}

impl<P: Projection, E: Event> UpdateMappingBuilder<'_, P, E> {
    pub fn ignoring_misses(mut self) -> Self {
        self.on_missing = MissingPolicy::Ignore;
        self
    }

    pub fn creating_if_missing(mut self) -> Self {
        self.on_missing = MissingPolicy::Create;
        self
    }

    pub fn using(
        self,
        mutate: impl Fn(&mut P, &E, &ProjectionContext) -> anyhow::Result<()> + Send + Sync + 'static,
    ) {
        self.map.register(Mapping {
            condition: self.condition,
            action: Action::Update {
                key: self.key,
                mutate: Arc::new(mutate),
                on_missing: self.on_missing,
            },
        });
    }
}

pub struct DeleteMappingBuilder<'m, P: Projection, E: Event> {
    map: &'m mut EventMapBuilder<P>,
    condition: Option<Condition<E>>,
    key: KeySelector<P, E>,
    index: usize,
}

impl<P: Projection, E: Event> DeleteMappingBuilder<'_, P, E> {
    pub fn ignoring_misses(self) {
        self.map.replace(
            self.index,
            Mapping {
                condition: self.condition,
                action: Action::Delete {
                    key: self.key,
                    on_missing: MissingPolicy::Ignore,
                },
            },
        );
    }
}
