use crate::schema::*;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Queryable, Serialize)]
pub struct Role {
    pub id: i32,
    pub name: String,
}

#[derive(Queryable)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role_id: i32,
}

#[derive(Queryable, Serialize)]
pub struct Subject {
    pub id: i32,
    pub name: String,
}

#[derive(Queryable, Serialize)]
pub struct Theme {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub subject_id: i32,
}

#[derive(Queryable, Serialize)]
pub struct Teacher {
    pub id: i32,
    pub name: String,
    pub phone_number: String,
}

#[derive(Queryable, Serialize)]
pub struct Question {
    pub id: i32,
    pub text: String,
    pub answer: String,
    pub max_mark: i32,
    pub theme_id: i32,
}

#[derive(Queryable)]
pub struct Test {
    pub id: i32,
    pub created_at: NaiveDateTime,
    pub user_id: i32,
}

#[derive(Queryable, Serialize)]
pub struct Answer {
    pub id: i32,
    pub given_answer: String,
    pub mark: i32,
    pub question_id: i32,
    pub test_id: i32,
}

#[derive(Insertable)]
#[table_name = "roles"]
pub struct NewRole<'a> {
    pub name: &'a str,
}

#[derive(Insertable)]
#[table_name = "users"]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub name: &'a str,
    pub password_hash: &'a str,
    pub role_id: i32,
}

#[derive(Insertable)]
#[table_name = "access_tokens"]
pub struct NewAccessToken<'a> {
    pub token_hash: &'a [u8],
    pub user_id: i32,
}

#[derive(Insertable)]
#[table_name = "subjects"]
pub struct NewSubject<'a> {
    pub name: &'a str,
}

#[derive(Insertable)]
#[table_name = "themes"]
pub struct NewTheme<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub subject_id: i32,
}

#[derive(Insertable)]
#[table_name = "teachers"]
pub struct NewTeacher<'a> {
    pub name: &'a str,
    pub phone_number: &'a str,
}

#[derive(Insertable, Queryable)]
#[table_name = "teacher_theme"]
pub struct TeacherTheme {
    pub teacher_id: i32,
    pub theme_id: i32,
}

#[derive(Insertable)]
#[table_name = "questions"]
pub struct NewQuestion<'a> {
    pub text: &'a str,
    pub answer: &'a str,
    pub max_mark: i32,
    pub theme_id: i32,
}

#[derive(Insertable)]
#[table_name = "tests"]
pub struct NewTest {
    pub created_at: NaiveDateTime,
    pub user_id: i32,
}

#[derive(Insertable, Queryable)]
#[table_name = "test_questions"]
pub struct TestQuestion {
    pub test_id: i32,
    pub question_id: i32,
}

#[derive(Insertable)]
#[table_name = "answers"]
pub struct NewAnswer<'a> {
    pub given_answer: &'a str,
    pub mark: i32,
    pub question_id: i32,
    pub test_id: i32,
}

/// Account payload for registration and self-update.
#[derive(Deserialize)]
pub struct AccountData {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginData {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(token: String) -> Self {
        TokenResponse {
            access_token: token,
            token_type: "bearer".into(),
        }
    }
}

/// The authenticated caller, with its role name resolved.
#[derive(Serialize)]
pub struct UserInfo {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub role: String,
}

#[derive(Deserialize)]
pub struct SubjectData {
    pub name: String,
}

#[derive(Deserialize)]
pub struct ThemeData {
    pub name: String,
    pub description: String,
}

#[derive(Deserialize)]
pub struct TeacherData {
    pub name: String,
    pub phone_number: String,
    pub theme_ids: Vec<i32>,
}

#[derive(Serialize)]
pub struct TeacherInfo {
    pub id: i32,
    pub name: String,
    pub phone_number: String,
    pub theme_ids: Vec<i32>,
}

#[derive(Deserialize)]
pub struct QuestionData {
    pub text: String,
    pub answer: String,
    pub max_mark: i32,
}

/// A question as shown to the test taker: no canonical answer.
#[derive(Serialize)]
pub struct QuestionView {
    pub id: i32,
    pub text: String,
    pub max_mark: i32,
    pub theme_id: i32,
}

impl From<Question> for QuestionView {
    fn from(q: Question) -> Self {
        QuestionView {
            id: q.id,
            text: q.text,
            max_mark: q.max_mark,
            theme_id: q.theme_id,
        }
    }
}

#[derive(Deserialize)]
pub struct GenerateTestData {
    pub theme_names: Vec<String>,
}

#[derive(Serialize)]
pub struct TestView {
    pub id: i32,
    pub created_at: NaiveDateTime,
    pub user_id: i32,
    pub questions: Vec<QuestionView>,
}

/// A test with the marks received so far, for the review listing.
#[derive(Serialize)]
pub struct TestSummary {
    pub id: i32,
    pub created_at: NaiveDateTime,
    pub answers: Vec<Answer>,
}

#[derive(Deserialize)]
pub struct AnswerData {
    pub given_answer: String,
}
