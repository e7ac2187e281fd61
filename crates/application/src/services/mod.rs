mod admission_service;
mod chat_service;
mod matching_service;

#[cfg(test)]
mod matching_service_tests;
#[cfg(test)]
pub(crate) mod test_support;

pub use admission_service::AdmissionService;
pub use chat_service::{ChatService, ChatServiceDependencies, SendMessageRequest};
pub use matching_service::{
    MatchingService, MatchingServiceDependencies, ReviewApplicationRequest, SwipeOutcome,
    SwipeRequest, SwipeResult, UpdateMatchRequest,
};
