use crate::auth;
use crate::error::ApiError;
use crate::marking;
use crate::models::*;
use crate::schema::*;
use chrono::Utc;
use diesel::pg::upsert::{excluded, on_constraint};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use log::info;
use rand::thread_rng;
use std::collections::HashMap;

pub type ApiResult<T> = Result<T, ApiError>;

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "administrator";

// ------------------------- users and tokens -------------------------

fn issue_token(conn: &PgConnection, user_id: i32) -> ApiResult<TokenResponse> {
    let (token, digest) = auth::generate_token();
    diesel::insert_into(access_tokens::table)
        .values(&NewAccessToken {
            token_hash: &digest,
            user_id,
        })
        .execute(conn)?;
    Ok(TokenResponse::bearer(token))
}

pub fn register_user(conn: &PgConnection, data: &AccountData) -> ApiResult<TokenResponse> {
    let existing = users::table
        .filter(users::email.eq(&data.email))
        .select(users::id)
        .first::<i32>(conn)
        .optional()?;
    if existing.is_some() {
        return Err(ApiError::Conflict("email already in use".into()));
    }
    let role_id = roles::table
        .filter(roles::name.eq(ROLE_USER))
        .select(roles::id)
        .first::<i32>(conn)
        .optional()?
        .ok_or_else(|| ApiError::Internal("roles are not seeded; run testportalctl init".into()))?;
    let password_hash = auth::hash_password(&data.password);
    let user: User = diesel::insert_into(users::table)
        .values(&NewUser {
            email: &data.email,
            name: &data.name,
            password_hash: &password_hash,
            role_id,
        })
        .get_result(conn)?;
    info!("registered user {} ({})", user.id, user.email);
    issue_token(conn, user.id)
}

pub fn login(conn: &PgConnection, data: &LoginData) -> ApiResult<TokenResponse> {
    let user = users::table
        .filter(users::email.eq(&data.email))
        .first::<User>(conn)
        .optional()?
        .ok_or_else(|| ApiError::Unauthorized("invalid credentials".into()))?;
    if !auth::verify_password(&data.password, &user.password_hash) {
        return Err(ApiError::Unauthorized("invalid credentials".into()));
    }
    issue_token(conn, user.id)
}

/// Resolves a presented bearer token to its user, or fails unauthorized.
pub fn user_for_token(conn: &PgConnection, token: &str) -> ApiResult<UserInfo> {
    let digest = auth::token_digest(token);
    let row = access_tokens::table
        .inner_join(users::table.inner_join(roles::table))
        .filter(access_tokens::token_hash.eq(digest))
        .select((users::id, users::email, users::name, roles::name))
        .first::<(i32, String, String, String)>(conn)
        .optional()?
        .ok_or_else(|| ApiError::Unauthorized("invalid bearer token".into()))?;
    Ok(UserInfo {
        id: row.0,
        email: row.1,
        name: row.2,
        role: row.3,
    })
}

/// Capability check performed by handlers before administrative mutations.
pub fn ensure_admin(user: &UserInfo) -> ApiResult<()> {
    if user.role == ROLE_ADMIN {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "must be an administrator to perform this action".into(),
        ))
    }
}

fn ensure_self(user_id: i32, current: &UserInfo) -> ApiResult<()> {
    if user_id == current.id {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "cannot modify another user's account".into(),
        ))
    }
}

pub fn list_users(conn: &PgConnection) -> ApiResult<Vec<UserInfo>> {
    let rows = users::table
        .inner_join(roles::table)
        .order(users::id)
        .select((users::id, users::email, users::name, roles::name))
        .load::<(i32, String, String, String)>(conn)?;
    Ok(rows
        .into_iter()
        .map(|(id, email, name, role)| UserInfo {
            id,
            email,
            name,
            role,
        })
        .collect())
}

pub fn get_user(conn: &PgConnection, user_id: i32) -> ApiResult<UserInfo> {
    users::table
        .inner_join(roles::table)
        .filter(users::id.eq(user_id))
        .select((users::id, users::email, users::name, roles::name))
        .first::<(i32, String, String, String)>(conn)
        .optional()?
        .map(|(id, email, name, role)| UserInfo {
            id,
            email,
            name,
            role,
        })
        .ok_or_else(|| ApiError::NotFound("user does not exist".into()))
}

pub fn update_user(
    conn: &PgConnection,
    user_id: i32,
    current: &UserInfo,
    data: &AccountData,
) -> ApiResult<UserInfo> {
    get_user(conn, user_id)?;
    ensure_self(user_id, current)?;
    let password_hash = auth::hash_password(&data.password);
    let updated: User = diesel::update(users::table.find(user_id))
        .set((
            users::email.eq(&data.email),
            users::name.eq(&data.name),
            users::password_hash.eq(&password_hash),
        ))
        .get_result(conn)?;
    Ok(UserInfo {
        id: updated.id,
        email: updated.email,
        name: updated.name,
        role: current.role.clone(),
    })
}

/// Deletes the account with everything hanging off it: tests, their
/// membership rows and answers, and all issued tokens.
pub fn delete_user(conn: &PgConnection, user_id: i32, current: &UserInfo) -> ApiResult<()> {
    get_user(conn, user_id)?;
    ensure_self(user_id, current)?;
    conn.transaction(|| {
        let test_ids: Vec<i32> = tests::table
            .filter(tests::user_id.eq(user_id))
            .select(tests::id)
            .load(conn)?;
        diesel::delete(answers::table.filter(answers::test_id.eq_any(&test_ids)))
            .execute(conn)?;
        diesel::delete(test_questions::table.filter(test_questions::test_id.eq_any(&test_ids)))
            .execute(conn)?;
        diesel::delete(tests::table.filter(tests::user_id.eq(user_id))).execute(conn)?;
        diesel::delete(access_tokens::table.filter(access_tokens::user_id.eq(user_id)))
            .execute(conn)?;
        diesel::delete(users::table.find(user_id)).execute(conn)?;
        Ok(())
    })
}

// ------------------------- subjects -------------------------

pub fn create_subject(conn: &PgConnection, data: &SubjectData) -> ApiResult<Subject> {
    Ok(diesel::insert_into(subjects::table)
        .values(&NewSubject { name: &data.name })
        .get_result(conn)?)
}

pub fn list_subjects(conn: &PgConnection) -> ApiResult<Vec<Subject>> {
    Ok(subjects::table.order(subjects::id).load(conn)?)
}

pub fn get_subject(conn: &PgConnection, subject_id: i32) -> ApiResult<Subject> {
    subjects::table
        .find(subject_id)
        .first::<Subject>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("subject does not exist".into()))
}

pub fn update_subject(
    conn: &PgConnection,
    subject_id: i32,
    data: &SubjectData,
) -> ApiResult<Subject> {
    get_subject(conn, subject_id)?;
    Ok(diesel::update(subjects::table.find(subject_id))
        .set(subjects::name.eq(&data.name))
        .get_result(conn)?)
}

pub fn delete_subject(conn: &PgConnection, subject_id: i32) -> ApiResult<()> {
    get_subject(conn, subject_id)?;
    conn.transaction(|| {
        let theme_ids: Vec<i32> = themes::table
            .filter(themes::subject_id.eq(subject_id))
            .select(themes::id)
            .load(conn)?;
        for theme_id in theme_ids {
            purge_theme(conn, theme_id)?;
        }
        diesel::delete(subjects::table.find(subject_id)).execute(conn)?;
        Ok(())
    })
}

// ------------------------- themes -------------------------

/// Removes a theme together with its questions and every row that points at
/// them (answers, test membership, teacher links).
fn purge_theme(conn: &PgConnection, theme_id: i32) -> ApiResult<()> {
    let question_ids: Vec<i32> = questions::table
        .filter(questions::theme_id.eq(theme_id))
        .select(questions::id)
        .load(conn)?;
    diesel::delete(answers::table.filter(answers::question_id.eq_any(&question_ids)))
        .execute(conn)?;
    diesel::delete(
        test_questions::table.filter(test_questions::question_id.eq_any(&question_ids)),
    )
    .execute(conn)?;
    diesel::delete(questions::table.filter(questions::theme_id.eq(theme_id))).execute(conn)?;
    diesel::delete(teacher_theme::table.filter(teacher_theme::theme_id.eq(theme_id)))
        .execute(conn)?;
    diesel::delete(themes::table.find(theme_id)).execute(conn)?;
    Ok(())
}

pub fn create_theme(conn: &PgConnection, subject_id: i32, data: &ThemeData) -> ApiResult<Theme> {
    get_subject(conn, subject_id)?;
    Ok(diesel::insert_into(themes::table)
        .values(&NewTheme {
            name: &data.name,
            description: &data.description,
            subject_id,
        })
        .get_result(conn)?)
}

pub fn list_themes(conn: &PgConnection, subject_id: i32) -> ApiResult<Vec<Theme>> {
    get_subject(conn, subject_id)?;
    Ok(themes::table
        .filter(themes::subject_id.eq(subject_id))
        .order(themes::id)
        .load(conn)?)
}

/// Theme lookup is always scoped: a valid theme id under the wrong subject
/// is not found.
pub fn get_theme(conn: &PgConnection, subject_id: i32, theme_id: i32) -> ApiResult<Theme> {
    themes::table
        .filter(themes::id.eq(theme_id))
        .filter(themes::subject_id.eq(subject_id))
        .first::<Theme>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("theme does not exist".into()))
}

fn theme_by_id(conn: &PgConnection, theme_id: i32) -> ApiResult<Theme> {
    themes::table
        .find(theme_id)
        .first::<Theme>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("theme does not exist".into()))
}

pub fn update_theme(
    conn: &PgConnection,
    subject_id: i32,
    theme_id: i32,
    data: &ThemeData,
) -> ApiResult<Theme> {
    get_theme(conn, subject_id, theme_id)?;
    Ok(diesel::update(themes::table.find(theme_id))
        .set((
            themes::name.eq(&data.name),
            themes::description.eq(&data.description),
        ))
        .get_result(conn)?)
}

pub fn delete_theme(conn: &PgConnection, subject_id: i32, theme_id: i32) -> ApiResult<()> {
    get_theme(conn, subject_id, theme_id)?;
    conn.transaction(|| purge_theme(conn, theme_id))
}

// ------------------------- teachers -------------------------

fn check_themes_exist(conn: &PgConnection, theme_ids: &[i32]) -> ApiResult<()> {
    for &theme_id in theme_ids {
        theme_by_id(conn, theme_id)?;
    }
    Ok(())
}

fn teacher_theme_ids(conn: &PgConnection, teacher_id: i32) -> ApiResult<Vec<i32>> {
    Ok(teacher_theme::table
        .filter(teacher_theme::teacher_id.eq(teacher_id))
        .select(teacher_theme::theme_id)
        .order(teacher_theme::theme_id)
        .load(conn)?)
}

fn link_teacher_themes(conn: &PgConnection, teacher_id: i32, theme_ids: &[i32]) -> ApiResult<()> {
    let links: Vec<TeacherTheme> = theme_ids
        .iter()
        .map(|&theme_id| TeacherTheme {
            teacher_id,
            theme_id,
        })
        .collect();
    diesel::insert_into(teacher_theme::table)
        .values(&links)
        .on_conflict_do_nothing()
        .execute(conn)?;
    Ok(())
}

pub fn create_teacher(conn: &PgConnection, data: &TeacherData) -> ApiResult<TeacherInfo> {
    conn.transaction(|| {
        check_themes_exist(conn, &data.theme_ids)?;
        let teacher: Teacher = diesel::insert_into(teachers::table)
            .values(&NewTeacher {
                name: &data.name,
                phone_number: &data.phone_number,
            })
            .get_result(conn)?;
        link_teacher_themes(conn, teacher.id, &data.theme_ids)?;
        let theme_ids = teacher_theme_ids(conn, teacher.id)?;
        Ok(TeacherInfo {
            id: teacher.id,
            name: teacher.name,
            phone_number: teacher.phone_number,
            theme_ids,
        })
    })
}

pub fn list_teachers(conn: &PgConnection) -> ApiResult<Vec<TeacherInfo>> {
    let teacher_rows: Vec<Teacher> = teachers::table.order(teachers::id).load(conn)?;
    let links: Vec<TeacherTheme> = teacher_theme::table.load(conn)?;
    let mut by_teacher = links
        .into_iter()
        .fold(HashMap::new(), |mut acc: HashMap<i32, Vec<i32>>, link| {
            acc.entry(link.teacher_id)
                .or_insert_with(Vec::new)
                .push(link.theme_id);
            acc
        });
    Ok(teacher_rows
        .into_iter()
        .map(|teacher| {
            let mut theme_ids = by_teacher.remove(&teacher.id).unwrap_or_default();
            theme_ids.sort_unstable();
            TeacherInfo {
                id: teacher.id,
                name: teacher.name,
                phone_number: teacher.phone_number,
                theme_ids,
            }
        })
        .collect())
}

pub fn get_teacher(conn: &PgConnection, teacher_id: i32) -> ApiResult<TeacherInfo> {
    let teacher = teachers::table
        .find(teacher_id)
        .first::<Teacher>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("teacher does not exist".into()))?;
    let theme_ids = teacher_theme_ids(conn, teacher_id)?;
    Ok(TeacherInfo {
        id: teacher.id,
        name: teacher.name,
        phone_number: teacher.phone_number,
        theme_ids,
    })
}

pub fn update_teacher(
    conn: &PgConnection,
    teacher_id: i32,
    data: &TeacherData,
) -> ApiResult<TeacherInfo> {
    get_teacher(conn, teacher_id)?;
    conn.transaction(|| {
        check_themes_exist(conn, &data.theme_ids)?;
        let teacher: Teacher = diesel::update(teachers::table.find(teacher_id))
            .set((
                teachers::name.eq(&data.name),
                teachers::phone_number.eq(&data.phone_number),
            ))
            .get_result(conn)?;
        diesel::delete(teacher_theme::table.filter(teacher_theme::teacher_id.eq(teacher_id)))
            .execute(conn)?;
        link_teacher_themes(conn, teacher_id, &data.theme_ids)?;
        let theme_ids = teacher_theme_ids(conn, teacher_id)?;
        Ok(TeacherInfo {
            id: teacher.id,
            name: teacher.name,
            phone_number: teacher.phone_number,
            theme_ids,
        })
    })
}

pub fn delete_teacher(conn: &PgConnection, teacher_id: i32) -> ApiResult<()> {
    get_teacher(conn, teacher_id)?;
    conn.transaction(|| {
        diesel::delete(teacher_theme::table.filter(teacher_theme::teacher_id.eq(teacher_id)))
            .execute(conn)?;
        diesel::delete(teachers::table.find(teacher_id)).execute(conn)?;
        Ok(())
    })
}

// ------------------------- questions -------------------------

pub fn create_question(
    conn: &PgConnection,
    theme_id: i32,
    data: &QuestionData,
) -> ApiResult<Question> {
    if data.max_mark < 1 {
        return Err(ApiError::BadRequest("max_mark must be at least 1".into()));
    }
    theme_by_id(conn, theme_id)?;
    Ok(diesel::insert_into(questions::table)
        .values(&NewQuestion {
            text: &data.text,
            answer: &data.answer,
            max_mark: data.max_mark,
            theme_id,
        })
        .get_result(conn)?)
}

pub fn list_questions(conn: &PgConnection) -> ApiResult<Vec<Question>> {
    Ok(questions::table.order(questions::id).load(conn)?)
}

pub fn get_question(conn: &PgConnection, question_id: i32) -> ApiResult<Question> {
    questions::table
        .find(question_id)
        .first::<Question>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("question does not exist".into()))
}

pub fn update_question(
    conn: &PgConnection,
    question_id: i32,
    data: &QuestionData,
) -> ApiResult<Question> {
    if data.max_mark < 1 {
        return Err(ApiError::BadRequest("max_mark must be at least 1".into()));
    }
    get_question(conn, question_id)?;
    Ok(diesel::update(questions::table.find(question_id))
        .set((
            questions::text.eq(&data.text),
            questions::answer.eq(&data.answer),
            questions::max_mark.eq(data.max_mark),
        ))
        .get_result(conn)?)
}

pub fn delete_question(conn: &PgConnection, question_id: i32) -> ApiResult<()> {
    get_question(conn, question_id)?;
    conn.transaction(|| {
        diesel::delete(answers::table.filter(answers::question_id.eq(question_id)))
            .execute(conn)?;
        diesel::delete(test_questions::table.filter(test_questions::question_id.eq(question_id)))
            .execute(conn)?;
        diesel::delete(questions::table.find(question_id)).execute(conn)?;
        Ok(())
    })
}

// ------------------------- tests -------------------------

/// Builds a new test for `user` from the named themes of a subject.
///
/// All theme names must resolve before anything is written; the whole
/// operation runs in one transaction, so a failed resolution or insert
/// leaves no rows behind. Themes with small pools contribute what they
/// have, which can make the test shorter than the target.
pub fn generate_test(
    conn: &PgConnection,
    subject_id: i32,
    theme_names: &[String],
    user: &UserInfo,
) -> ApiResult<TestView> {
    if theme_names.is_empty() {
        return Err(ApiError::BadRequest("theme name list is empty".into()));
    }
    conn.transaction(|| {
        get_subject(conn, subject_id)?;
        let mut resolved = Vec::with_capacity(theme_names.len());
        for name in theme_names {
            let theme = themes::table
                .filter(themes::subject_id.eq(subject_id))
                .filter(themes::name.eq(name))
                .first::<Theme>(conn)
                .optional()?
                .ok_or_else(|| {
                    ApiError::NotFound(format!("no theme named {:?} in this subject", name))
                })?;
            resolved.push(theme);
        }

        let amounts = marking::question_amounts(marking::QUESTIONS_PER_TEST, resolved.len());
        let mut rng = thread_rng();
        let mut picked = Vec::new();
        for (theme, amount) in resolved.iter().zip(amounts) {
            let pool: Vec<i32> = questions::table
                .filter(questions::theme_id.eq(theme.id))
                .select(questions::id)
                .load(conn)?;
            picked.extend(marking::sample_questions(&mut rng, &pool, amount));
        }

        let test: Test = diesel::insert_into(tests::table)
            .values(&NewTest {
                created_at: Utc::now().naive_utc(),
                user_id: user.id,
            })
            .get_result(conn)?;
        let memberships: Vec<TestQuestion> = picked
            .iter()
            .map(|&question_id| TestQuestion {
                test_id: test.id,
                question_id,
            })
            .collect();
        diesel::insert_into(test_questions::table)
            .values(&memberships)
            .execute(conn)?;

        let question_rows: Vec<Question> = questions::table
            .filter(questions::id.eq_any(&picked))
            .load(conn)?;
        info!(
            "generated test {} with {} questions for user {}",
            test.id,
            question_rows.len(),
            user.id
        );
        Ok(TestView {
            id: test.id,
            created_at: test.created_at,
            user_id: test.user_id,
            questions: question_rows.into_iter().map(QuestionView::from).collect(),
        })
    })
}

fn test_for_user(conn: &PgConnection, test_id: i32, user: &UserInfo) -> ApiResult<Test> {
    tests::table
        .filter(tests::id.eq(test_id))
        .filter(tests::user_id.eq(user.id))
        .first::<Test>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("test does not exist".into()))
}

pub fn get_test(conn: &PgConnection, test_id: i32, user: &UserInfo) -> ApiResult<TestView> {
    let test = test_for_user(conn, test_id, user)?;
    let question_ids: Vec<i32> = test_questions::table
        .filter(test_questions::test_id.eq(test_id))
        .select(test_questions::question_id)
        .load(conn)?;
    let question_rows: Vec<Question> = questions::table
        .filter(questions::id.eq_any(&question_ids))
        .order(questions::id)
        .load(conn)?;
    Ok(TestView {
        id: test.id,
        created_at: test.created_at,
        user_id: test.user_id,
        questions: question_rows.into_iter().map(QuestionView::from).collect(),
    })
}

/// The calling user's tests with the marks received so far.
pub fn list_tests(conn: &PgConnection, user: &UserInfo) -> ApiResult<Vec<TestSummary>> {
    let test_rows: Vec<Test> = tests::table
        .filter(tests::user_id.eq(user.id))
        .order(tests::id)
        .load(conn)?;
    let test_ids: Vec<i32> = test_rows.iter().map(|test| test.id).collect();
    let answer_rows: Vec<Answer> = answers::table
        .filter(answers::test_id.eq_any(&test_ids))
        .order(answers::id)
        .load(conn)?;
    let mut by_test = answer_rows
        .into_iter()
        .fold(HashMap::new(), |mut acc: HashMap<i32, Vec<Answer>>, row| {
            acc.entry(row.test_id).or_insert_with(Vec::new).push(row);
            acc
        });
    Ok(test_rows
        .into_iter()
        .map(|test| TestSummary {
            id: test.id,
            created_at: test.created_at,
            answers: by_test.remove(&test.id).unwrap_or_default(),
        })
        .collect())
}

// ------------------------- answers -------------------------

/// Marks and stores a submission for one question of one test. Keyed on
/// (test_id, question_id): a resubmission overwrites the stored text and
/// mark in place via the unique index on that pair.
pub fn submit_answer(
    conn: &PgConnection,
    test_id: i32,
    question_id: i32,
    user: &UserInfo,
    data: &AnswerData,
) -> ApiResult<Answer> {
    test_for_user(conn, test_id, user)?;
    let member = test_questions::table
        .filter(test_questions::test_id.eq(test_id))
        .filter(test_questions::question_id.eq(question_id))
        .first::<TestQuestion>(conn)
        .optional()?;
    if member.is_none() {
        return Err(ApiError::NotFound(
            "question is not part of this test".into(),
        ));
    }
    let question = get_question(conn, question_id)?;
    let mark = marking::mark_answer(&question.answer, question.max_mark, &data.given_answer);
    Ok(diesel::insert_into(answers::table)
        .values(&NewAnswer {
            given_answer: &data.given_answer,
            mark,
            question_id,
            test_id,
        })
        .on_conflict(on_constraint("answers_test_question_unique"))
        .do_update()
        .set((
            answers::given_answer.eq(excluded(answers::given_answer)),
            answers::mark.eq(excluded(answers::mark)),
        ))
        .get_result(conn)?)
}
