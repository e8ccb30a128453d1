//! The fixed, labelled example set the topic gate compares questions against.

use crate::router::{Route, RouteLabel};

/// Route for questions about Paul Allen himself.
pub const PAUL_ALLEN_ROUTE: &str = "paul_allen_questions";
/// Route for labelled off-topic examples.
pub const OFF_TOPIC_ROUTE: &str = "off_topic";

const PAUL_ALLEN_UTTERANCES: &[&str] = &[
    // identity
    "who is paul allen?",
    "tell me about paul allen's life",
    "what is paul allen known for?",
    // microsoft and business
    "what was his role at microsoft?",
    "tell me about his business ventures and investments",
    "what is vulcan inc?",
    "did he have any patents?",
    "what's the story behind Traf-O-Data?",
    // philanthropy and science
    "describe paul allen's philanthropy",
    "what are the Allen Institutes?",
    "did he sign the giving pledge?",
    "tell me about his contributions to science and research",
    // personal life
    "what sports teams did he own?",
    "tell me about his yachts, Octopus and Tatoosh",
    "was he a musician?",
    "did he write a book?",
    "when did paul allen die?",
    // exploration
    "what was his involvement with SpaceShipOne?",
    "tell me about the Stratolaunch project",
    "was the bell from HMS Hood successfully retrieved?",
];

const GREETING_UTTERANCES: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "good morning",
    "good afternoon",
    "how are you today?",
];

const FAREWELL_UTTERANCES: &[&str] = &[
    "goodbye",
    "bye",
    "see you later",
    "take care",
    "have a good one",
];

const GRATITUDE_UTTERANCES: &[&str] = &[
    "thank you",
    "thanks",
    "appreciate it",
    "thanks for your help",
    "you're welcome",
];

const OFF_TOPIC_UTTERANCES: &[&str] = &[
    "what's the weather like tomorrow?",
    "write a python function that reverses a list",
    "give me a recipe for chocolate chip cookies",
    "who won the world cup in 2022?",
    "what is the capital of australia?",
    "explain how photosynthesis works",
    "recommend a good movie to watch tonight",
    "how do i fix a flat bicycle tire?",
    "translate this sentence into french",
    "what is the stock price of apple today?",
];

/// Builds the default route set: four in-domain routes and one off-topic route.
pub fn default_routes() -> Vec<Route> {
    vec![
        Route::new(PAUL_ALLEN_ROUTE, RouteLabel::InDomain, PAUL_ALLEN_UTTERANCES),
        Route::new("greetings", RouteLabel::InDomain, GREETING_UTTERANCES),
        Route::new("farewells", RouteLabel::InDomain, FAREWELL_UTTERANCES),
        Route::new("gratitude", RouteLabel::InDomain, GRATITUDE_UTTERANCES),
        Route::new(OFF_TOPIC_ROUTE, RouteLabel::OffTopic, OFF_TOPIC_UTTERANCES),
    ]
}

/// Reply sent instead of an answer when a question is off-topic.
pub const REFUSAL_MESSAGE: &str = "I apologize, but I am an AI agent designed specifically to answer questions about Paul Allen. I cannot assist with other topics.";

/// Display name the assistant uses in the chat UI.
pub const ASSISTANT_NAME: &str = "Paul Allen AI Agent";

/// Header and greeting shown when a chat session starts.
pub const WELCOME_MESSAGES: &[&str] = &[
    "Paul Allen Archives",
    "\u{1F4A1} From Microsoft to Megayachts: Ask Anything",
    "Hello! Please ask me anything about Microsoft's co-founder - Paul Allen, his life, career, or interests. I am here to help!",
];
