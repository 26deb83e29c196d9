pub mod shared {
    pub mod core {
        pub mod primitives;
    }
    pub mod infrastructure {
        pub mod cancellation;
        pub mod store;
    }
}

pub mod modules {
    pub mod projections {
        pub mod core {
            pub mod batches;
            pub mod context;
            pub mod errors;
            pub mod projection;
            pub mod projector_state;
            pub mod resolution;
            pub mod transaction;
        }
        pub mod cache;
        pub mod event_map;
        pub mod use_cases {
            pub mod project_transactions {
                pub mod child_projector;
                pub mod handler;
                pub mod mapper;
                pub mod options;
            }
        }
        pub mod adapters {
            pub mod inbound {
                pub mod in_memory_event_source;
                pub mod json_lines_event_source;
            }
        }
    }
}

pub mod shell;
