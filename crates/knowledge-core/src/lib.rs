//! Question/response domain model for the knowledge base.
//!
//! Entities are plain values. Relationships are explicit foreign-key fields,
//! and anything that needs to traverse them (answered state, inherited
//! visibility, listing) goes through a [`KnowledgeRepository`] supplied by the
//! caller. Visibility is decided per request against a [`Viewer`].

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};
use unicode_normalization::UnicodeNormalization;

pub const QUESTION_URL_PREFIX: &str = "/knowledge/questions";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum KnowledgeError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid operand: {0}")]
    InvalidOperand(String),
    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct UserId(pub i64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct QuestionId(pub i64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct ResponseId(pub i64);

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for QuestionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for ResponseId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Visibility of a question. Questions have no parent, so they cannot inherit.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Public,
    #[default]
    Private,
    Internal,
}

impl QuestionStatus {
    pub const ALL: [Self; 3] = [Self::Public, Self::Private, Self::Internal];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Internal => "internal",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }
}

/// Visibility of a response. `Inherit` defers to the parent question.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Public,
    Private,
    Internal,
    #[default]
    Inherit,
}

impl ResponseStatus {
    pub const ALL: [Self; 4] = [Self::Public, Self::Private, Self::Internal, Self::Inherit];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Internal => "internal",
            Self::Inherit => "inherit",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            "internal" => Some(Self::Internal),
            "inherit" => Some(Self::Inherit),
            _ => None,
        }
    }

    /// The status this response applies on its own, or `None` when inheriting.
    #[must_use]
    pub fn explicit(self) -> Option<QuestionStatus> {
        match self {
            Self::Public => Some(QuestionStatus::Public),
            Self::Private => Some(QuestionStatus::Private),
            Self::Internal => Some(QuestionStatus::Internal),
            Self::Inherit => None,
        }
    }
}

impl From<QuestionStatus> for ResponseStatus {
    fn from(value: QuestionStatus) -> Self {
        match value {
            QuestionStatus::Public => Self::Public,
            QuestionStatus::Private => Self::Private,
            QuestionStatus::Internal => Self::Internal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl User {
    /// Full name when one is set, otherwise the username.
    #[must_use]
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }

    #[must_use]
    pub fn is_privileged(&self) -> bool {
        self.is_staff || self.is_superuser
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct UserInput {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl UserInput {
    /// # Errors
    /// Returns [`KnowledgeError::Validation`] when the username is blank.
    pub fn validate(&self) -> Result<(), KnowledgeError> {
        if self.username.trim().is_empty() {
            return Err(KnowledgeError::Validation(
                "username MUST be provided".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn into_user(self, id: UserId) -> User {
        User {
            id,
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            is_staff: self.is_staff,
            is_superuser: self.is_superuser,
        }
    }
}

/// Who is looking, resolved once per request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum Viewer {
    Anonymous,
    Authenticated(UserId),
    Privileged(UserId),
}

impl Viewer {
    #[must_use]
    pub fn for_user(user: Option<&User>) -> Self {
        match user {
            None => Self::Anonymous,
            Some(user) if user.is_privileged() => Self::Privileged(user.id),
            Some(user) => Self::Authenticated(user.id),
        }
    }

    #[must_use]
    pub fn user_id(self) -> Option<UserId> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(id) | Self::Privileged(id) => Some(id),
        }
    }

    #[must_use]
    pub fn is_privileged(self) -> bool {
        matches!(self, Self::Privileged(_))
    }

    /// Anonymous content has no owner, so nobody owns it.
    #[must_use]
    pub fn owns(self, owner: Option<UserId>) -> bool {
        match (self.user_id(), owner) {
            (Some(viewer), Some(owner)) => viewer == owner,
            _ => false,
        }
    }
}

fn status_allows(status: QuestionStatus, viewer: Viewer, owners: &[Option<UserId>]) -> bool {
    match status {
        QuestionStatus::Public => true,
        QuestionStatus::Internal => viewer.is_privileged(),
        QuestionStatus::Private => {
            viewer.is_privileged() || owners.iter().any(|owner| viewer.owns(*owner))
        }
    }
}

/// Author identity shared by questions and responses.
pub trait Authored {
    fn author(&self) -> Option<UserId>;
    fn anonymous_name(&self) -> Option<&str>;
    fn anonymous_email(&self) -> Option<&str>;

    /// Display name of the attached user, falling back to the name captured
    /// at creation when no user is attached.
    ///
    /// # Errors
    /// Returns [`KnowledgeError::NotFound`] when an author is attached but
    /// `user` is not that author's record.
    fn get_name(&self, user: Option<&User>) -> Result<String, KnowledgeError> {
        Ok(match attached(self.author(), user)? {
            Some(user) => user.display_name(),
            None => self.anonymous_name().unwrap_or_default().to_string(),
        })
    }

    /// # Errors
    /// Returns [`KnowledgeError::NotFound`] when an author is attached but
    /// `user` is not that author's record.
    fn get_email(&self, user: Option<&User>) -> Result<String, KnowledgeError> {
        Ok(match attached(self.author(), user)? {
            Some(user) => user.email.clone(),
            None => self.anonymous_email().unwrap_or_default().to_string(),
        })
    }
}

fn attached(
    author: Option<UserId>,
    user: Option<&User>,
) -> Result<Option<&User>, KnowledgeError> {
    match (author, user) {
        (None, _) => Ok(None),
        (Some(id), Some(user)) if user.id == id => Ok(Some(user)),
        (Some(id), Some(other)) => Err(KnowledgeError::NotFound(format!(
            "author user {id} (got user {})",
            other.id
        ))),
        (Some(id), None) => Err(KnowledgeError::NotFound(format!("author user {id}"))),
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(str::trim).unwrap_or_default().is_empty()
}

fn validate_author(
    user: Option<UserId>,
    name: Option<&str>,
    email: Option<&str>,
) -> Result<(), KnowledgeError> {
    if user.is_some() {
        return Ok(());
    }
    if is_blank(name) {
        return Err(KnowledgeError::Validation(
            "name MUST be provided when no user is attached".to_string(),
        ));
    }
    if is_blank(email) {
        return Err(KnowledgeError::Validation(
            "email MUST be provided when no user is attached".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionInput {
    pub user: Option<UserId>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub title: String,
    pub body: String,
    pub status: Option<QuestionStatus>,
}

impl QuestionInput {
    /// # Errors
    /// Returns [`KnowledgeError::Validation`] when title or body is blank, or
    /// when an anonymous question lacks a name or email.
    pub fn validate(&self) -> Result<(), KnowledgeError> {
        if self.title.trim().is_empty() {
            return Err(KnowledgeError::Validation(
                "title MUST be provided".to_string(),
            ));
        }
        if self.body.trim().is_empty() {
            return Err(KnowledgeError::Validation(
                "body MUST be provided".to_string(),
            ));
        }
        validate_author(self.user, self.name.as_deref(), self.email.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Question {
    pub id: QuestionId,
    pub user: Option<UserId>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub title: String,
    pub body: String,
    pub status: QuestionStatus,
    pub accepted_response: Option<ResponseId>,
    #[serde(with = "time::serde::rfc3339")]
    pub added: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub lastchanged: OffsetDateTime,
}

impl Question {
    /// Builds a question record from validated input.
    ///
    /// # Errors
    /// Returns [`KnowledgeError::Validation`] when the input is invalid.
    pub fn create(
        id: QuestionId,
        input: QuestionInput,
        now: OffsetDateTime,
    ) -> Result<Self, KnowledgeError> {
        input.validate()?;
        Ok(Self {
            id,
            user: input.user,
            name: input.name,
            email: input.email,
            title: input.title,
            body: input.body,
            status: input.status.unwrap_or_default(),
            accepted_response: None,
            added: now,
            lastchanged: now,
        })
    }

    pub fn public(&mut self) {
        self.set_status(QuestionStatus::Public);
    }

    pub fn private(&mut self) {
        self.set_status(QuestionStatus::Private);
    }

    pub fn internal(&mut self) {
        self.set_status(QuestionStatus::Internal);
    }

    pub fn set_status(&mut self, status: QuestionStatus) {
        tracing::debug!(
            question = %self.id,
            from = self.status.as_str(),
            to = status.as_str(),
            "question status switch"
        );
        self.status = status;
        self.lastchanged = now_utc();
    }

    #[must_use]
    pub fn can_view(&self, viewer: Viewer) -> bool {
        status_allows(self.status, viewer, &[self.user])
    }

    /// Whether any response exists for this question.
    ///
    /// # Errors
    /// Propagates lookup failures from the repository.
    pub fn answered<R: KnowledgeRepository>(&self, repo: &R) -> Result<bool, R::Error> {
        repo.has_responses(self.id)
    }

    #[must_use]
    pub fn accepted(&self) -> bool {
        self.accepted_response.is_some()
    }

    /// Designates `response` as the accepted answer, or clears the
    /// designation when `None`. Repeating the current state changes nothing.
    ///
    /// # Errors
    /// Returns [`KnowledgeError::InvalidOperand`] when the response belongs to
    /// another question; the current designation is left untouched.
    pub fn accept(&mut self, response: Option<&Response>) -> Result<(), KnowledgeError> {
        let target = match response {
            None => None,
            Some(response) if response.question != self.id => {
                return Err(KnowledgeError::InvalidOperand(format!(
                    "response {} belongs to question {}, not {}",
                    response.id, response.question, self.id
                )));
            }
            Some(response) => Some(response.id),
        };

        if self.accepted_response != target {
            tracing::debug!(question = %self.id, accepted = ?target, "accepted response changed");
            self.accepted_response = target;
            self.lastchanged = now_utc();
        }
        Ok(())
    }

    #[must_use]
    pub fn slug(&self) -> String {
        slugify(&self.title)
    }

    /// Canonical URL. A title with nothing sluggable yields the id-only form.
    #[must_use]
    pub fn get_absolute_url(&self) -> String {
        let slug = self.slug();
        if slug.is_empty() {
            format!("{QUESTION_URL_PREFIX}/{}/", self.id)
        } else {
            format!("{QUESTION_URL_PREFIX}/{}/{slug}/", self.id)
        }
    }
}

impl Authored for Question {
    fn author(&self) -> Option<UserId> {
        self.user
    }

    fn anonymous_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn anonymous_email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseInput {
    pub question: QuestionId,
    pub user: Option<UserId>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub body: String,
    pub status: Option<ResponseStatus>,
}

impl ResponseInput {
    /// # Errors
    /// Returns [`KnowledgeError::Validation`] when the body is blank or an
    /// anonymous response lacks a name or email.
    pub fn validate(&self) -> Result<(), KnowledgeError> {
        if self.body.trim().is_empty() {
            return Err(KnowledgeError::Validation(
                "body MUST be provided".to_string(),
            ));
        }
        validate_author(self.user, self.name.as_deref(), self.email.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Response {
    pub id: ResponseId,
    pub question: QuestionId,
    pub user: Option<UserId>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub body: String,
    pub status: ResponseStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub added: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub lastchanged: OffsetDateTime,
}

impl Response {
    /// # Errors
    /// Returns [`KnowledgeError::Validation`] when the input is invalid.
    pub fn create(
        id: ResponseId,
        input: ResponseInput,
        now: OffsetDateTime,
    ) -> Result<Self, KnowledgeError> {
        input.validate()?;
        Ok(Self {
            id,
            question: input.question,
            user: input.user,
            name: input.name,
            email: input.email,
            body: input.body,
            status: input.status.unwrap_or_default(),
            added: now,
            lastchanged: now,
        })
    }

    pub fn public(&mut self) {
        self.set_status(ResponseStatus::Public);
    }

    pub fn private(&mut self) {
        self.set_status(ResponseStatus::Private);
    }

    pub fn internal(&mut self) {
        self.set_status(ResponseStatus::Internal);
    }

    pub fn inherit(&mut self) {
        self.set_status(ResponseStatus::Inherit);
    }

    pub fn set_status(&mut self, status: ResponseStatus) {
        tracing::debug!(
            response = %self.id,
            from = self.status.as_str(),
            to = status.as_str(),
            "response status switch"
        );
        self.status = status;
        self.lastchanged = now_utc();
    }

    /// Visibility of this response given its parent `question` as it is now.
    ///
    /// A private response is also visible to the author of the question it
    /// answers. Passing any question other than the parent yields `false`.
    #[must_use]
    pub fn can_view(&self, question: &Question, viewer: Viewer) -> bool {
        if question.id != self.question {
            tracing::warn!(
                response = %self.id,
                parent = %self.question,
                given = %question.id,
                "visibility checked against a foreign question"
            );
            return false;
        }

        match self.status.explicit() {
            None => question.can_view(viewer),
            Some(status) => status_allows(status, viewer, &[self.user, question.user]),
        }
    }

    #[must_use]
    pub fn is_accepted(&self, question: &Question) -> bool {
        question.id == self.question && question.accepted_response == Some(self.id)
    }
}

impl Authored for Response {
    fn author(&self) -> Option<UserId> {
        self.user
    }

    fn anonymous_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn anonymous_email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}

/// Lookup capability over persisted knowledge records.
///
/// Implementors provide the primitive lookups; visibility-aware traversal is
/// derived from them and always reloads the parent question.
pub trait KnowledgeRepository {
    type Error: From<KnowledgeError>;

    /// # Errors
    /// Implementation-defined lookup failure.
    fn user(&self, id: UserId) -> Result<Option<User>, Self::Error>;

    /// # Errors
    /// Implementation-defined lookup failure.
    fn question(&self, id: QuestionId) -> Result<Option<Question>, Self::Error>;

    /// # Errors
    /// Implementation-defined lookup failure.
    fn response(&self, id: ResponseId) -> Result<Option<Response>, Self::Error>;

    /// All questions ordered by id.
    ///
    /// # Errors
    /// Implementation-defined lookup failure.
    fn questions(&self) -> Result<Vec<Question>, Self::Error>;

    /// Responses of one question ordered by id.
    ///
    /// # Errors
    /// Implementation-defined lookup failure.
    fn responses_for(&self, question: QuestionId) -> Result<Vec<Response>, Self::Error>;

    /// # Errors
    /// Implementation-defined lookup failure.
    fn has_responses(&self, question: QuestionId) -> Result<bool, Self::Error> {
        Ok(!self.responses_for(question)?.is_empty())
    }

    /// Resolves a viewer from an optional user id. Unknown ids are anonymous.
    ///
    /// # Errors
    /// Implementation-defined lookup failure.
    fn viewer_for(&self, user: Option<UserId>) -> Result<Viewer, Self::Error> {
        match user {
            None => Ok(Viewer::Anonymous),
            Some(id) => Ok(Viewer::for_user(self.user(id)?.as_ref())),
        }
    }

    /// # Errors
    /// Implementation-defined lookup failure.
    fn response_visible(&self, response: &Response, viewer: Viewer) -> Result<bool, Self::Error> {
        Ok(match self.question(response.question)? {
            Some(question) => response.can_view(&question, viewer),
            None => false,
        })
    }

    /// # Errors
    /// Implementation-defined lookup failure.
    fn visible_questions(&self, viewer: Viewer) -> Result<Vec<Question>, Self::Error> {
        let mut questions = self.questions()?;
        questions.retain(|question| question.can_view(viewer));
        Ok(questions)
    }

    /// # Errors
    /// Implementation-defined lookup failure.
    fn visible_responses(
        &self,
        question: &Question,
        viewer: Viewer,
    ) -> Result<Vec<Response>, Self::Error> {
        let mut responses = self.responses_for(question.id)?;
        responses.retain(|response| response.can_view(question, viewer));
        Ok(responses)
    }

    /// # Errors
    /// Implementation-defined lookup failure.
    fn author_of<A: Authored>(&self, item: &A) -> Result<Option<User>, Self::Error> {
        match item.author() {
            Some(id) => self.user(id),
            None => Ok(None),
        }
    }

    /// Resolves the author record and returns its display name.
    ///
    /// # Errors
    /// Lookup failure, or [`KnowledgeError::NotFound`] when the attached
    /// author no longer exists.
    fn name_of<A: Authored>(&self, item: &A) -> Result<String, Self::Error> {
        let author = self.author_of(item)?;
        Ok(item.get_name(author.as_ref())?)
    }

    /// # Errors
    /// Lookup failure, or [`KnowledgeError::NotFound`] when the attached
    /// author no longer exists.
    fn email_of<A: Authored>(&self, item: &A) -> Result<String, Self::Error> {
        let author = self.author_of(item)?;
        Ok(item.get_email(author.as_ref())?)
    }
}

/// In-process knowledge base. Each entity kind has its own id sequence.
#[derive(Debug, Default, Clone)]
pub struct MemoryKnowledgeBase {
    users: BTreeMap<UserId, User>,
    questions: BTreeMap<QuestionId, Question>,
    responses: BTreeMap<ResponseId, Response>,
    last_user_id: i64,
    last_question_id: i64,
    last_response_id: i64,
}

impl MemoryKnowledgeBase {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns [`KnowledgeError::Validation`] for invalid input.
    pub fn create_user(&mut self, input: UserInput) -> Result<User, KnowledgeError> {
        input.validate()?;
        let user = input.into_user(UserId(next_id(&mut self.last_user_id)));
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    /// # Errors
    /// Returns [`KnowledgeError::Validation`] for invalid input and
    /// [`KnowledgeError::NotFound`] when the owning user does not exist.
    pub fn create_question(&mut self, input: QuestionInput) -> Result<Question, KnowledgeError> {
        if let Some(user) = input.user {
            if !self.users.contains_key(&user) {
                return Err(KnowledgeError::NotFound(format!("user {user}")));
            }
        }
        let id = QuestionId(next_id(&mut self.last_question_id));
        let question = Question::create(id, input, now_utc())?;
        self.questions.insert(question.id, question.clone());
        Ok(question)
    }

    /// # Errors
    /// Returns [`KnowledgeError::Validation`] for invalid input and
    /// [`KnowledgeError::NotFound`] when the question or user does not exist.
    pub fn create_response(&mut self, input: ResponseInput) -> Result<Response, KnowledgeError> {
        if !self.questions.contains_key(&input.question) {
            return Err(KnowledgeError::NotFound(format!(
                "question {}",
                input.question
            )));
        }
        if let Some(user) = input.user {
            if !self.users.contains_key(&user) {
                return Err(KnowledgeError::NotFound(format!("user {user}")));
            }
        }
        let id = ResponseId(next_id(&mut self.last_response_id));
        let response = Response::create(id, input, now_utc())?;
        self.responses.insert(response.id, response.clone());
        Ok(response)
    }

    /// Persists the mutable state of an existing question.
    ///
    /// # Errors
    /// Returns [`KnowledgeError::NotFound`] for unknown questions and
    /// [`KnowledgeError::InvalidOperand`] when the accepted response belongs
    /// elsewhere.
    pub fn save_question(&mut self, question: &Question) -> Result<(), KnowledgeError> {
        if let Some(accepted) = question.accepted_response {
            match self.responses.get(&accepted) {
                Some(response) if response.question == question.id => {}
                Some(response) => {
                    return Err(KnowledgeError::InvalidOperand(format!(
                        "response {accepted} belongs to question {}, not {}",
                        response.question, question.id
                    )));
                }
                None => return Err(KnowledgeError::NotFound(format!("response {accepted}"))),
            }
        }
        let stored = self
            .questions
            .get_mut(&question.id)
            .ok_or_else(|| KnowledgeError::NotFound(format!("question {}", question.id)))?;
        stored.status = question.status;
        stored.accepted_response = question.accepted_response;
        stored.lastchanged = question.lastchanged;
        Ok(())
    }

    /// # Errors
    /// Returns [`KnowledgeError::NotFound`] for unknown responses.
    pub fn save_response(&mut self, response: &Response) -> Result<(), KnowledgeError> {
        let stored = self
            .responses
            .get_mut(&response.id)
            .ok_or_else(|| KnowledgeError::NotFound(format!("response {}", response.id)))?;
        stored.status = response.status;
        stored.lastchanged = response.lastchanged;
        Ok(())
    }
}

fn next_id(last: &mut i64) -> i64 {
    *last += 1;
    *last
}

impl KnowledgeRepository for MemoryKnowledgeBase {
    type Error = KnowledgeError;

    fn user(&self, id: UserId) -> Result<Option<User>, Self::Error> {
        Ok(self.users.get(&id).cloned())
    }

    fn question(&self, id: QuestionId) -> Result<Option<Question>, Self::Error> {
        Ok(self.questions.get(&id).cloned())
    }

    fn response(&self, id: ResponseId) -> Result<Option<Response>, Self::Error> {
        Ok(self.responses.get(&id).cloned())
    }

    fn questions(&self) -> Result<Vec<Question>, Self::Error> {
        Ok(self.questions.values().cloned().collect())
    }

    fn responses_for(&self, question: QuestionId) -> Result<Vec<Response>, Self::Error> {
        Ok(self
            .responses
            .values()
            .filter(|response| response.question == question)
            .cloned()
            .collect())
    }

    fn has_responses(&self, question: QuestionId) -> Result<bool, Self::Error> {
        Ok(self
            .responses
            .values()
            .any(|response| response.question == question))
    }
}

/// URL slug: lowercase ASCII words joined by single hyphens.
///
/// The value is NFKD-decomposed so accented letters keep their base letter.
/// Remaining characters other than ASCII alphanumerics, `_`, `-` and
/// whitespace are dropped before runs of whitespace and hyphens collapse.
#[must_use]
pub fn slugify(value: &str) -> String {
    let kept: String = value
        .nfkd()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_' || *ch == '-' || ch.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();

    let mut slug = String::with_capacity(kept.len());
    let mut pending_separator = false;
    for ch in kept.trim().chars() {
        if ch == '-' || ch.is_whitespace() {
            pending_separator = true;
            continue;
        }
        if pending_separator && !slug.is_empty() {
            slug.push('-');
        }
        pending_separator = false;
        slug.push(ch);
    }
    slug
}

/// Parses an RFC3339 timestamp and requires a UTC offset.
///
/// # Errors
/// Returns [`KnowledgeError::Validation`] when parsing fails or the offset is
/// not UTC.
pub fn parse_rfc3339_utc(value: &str) -> Result<OffsetDateTime, KnowledgeError> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| KnowledgeError::Validation(format!("invalid RFC3339 timestamp: {err}")))?;

    if parsed.offset() != UtcOffset::UTC {
        return Err(KnowledgeError::Validation(
            "timestamp MUST use UTC offset Z".to_string(),
        ));
    }

    Ok(parsed)
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`KnowledgeError::Validation`] if formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, KnowledgeError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| {
            KnowledgeError::Validation(format!("failed to format RFC3339 timestamp: {err}"))
        })
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}
