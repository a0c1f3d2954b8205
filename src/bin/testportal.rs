use actix_cors::Cors;
use actix_web::error::BlockingError;
use actix_web::http::header;
use actix_web::{delete, get, middleware, post, put, web, App, HttpResponse, HttpServer};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use diesel::pg::PgConnection;
use diesel::r2d2::ConnectionManager;
use std::net::SocketAddr;
use structopt::StructOpt;
use testportal::error::ApiError;
use testportal::{actions, models};

type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

fn blocking(e: BlockingError<ApiError>) -> ApiError {
    match e {
        BlockingError::Error(e) => e,
        BlockingError::Canceled => ApiError::Internal("blocking task canceled".into()),
    }
}

#[get("")]
async fn api_index() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "detail": "testportal is up" }))
}

// ------------------------- users and tokens -------------------------

#[post("/users")]
async fn api_register(
    pool: web::Data<DbPool>,
    web::Json(data): web::Json<models::AccountData>,
) -> Result<web::Json<models::TokenResponse>, ApiError> {
    let token = web::block(move || {
        let conn = pool.get()?;
        actions::register_user(&conn, &data)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(token))
}

#[post("/token")]
async fn api_token(
    pool: web::Data<DbPool>,
    web::Json(data): web::Json<models::LoginData>,
) -> Result<web::Json<models::TokenResponse>, ApiError> {
    let token = web::block(move || {
        let conn = pool.get()?;
        actions::login(&conn, &data)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(token))
}

#[get("/users")]
async fn api_users(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
) -> Result<web::Json<Vec<models::UserInfo>>, ApiError> {
    let token = auth.token().to_string();
    let users = web::block(move || {
        let conn = pool.get()?;
        actions::user_for_token(&conn, &token)?;
        actions::list_users(&conn)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(users))
}

#[get("/users/me")]
async fn api_current_user(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
) -> Result<web::Json<models::UserInfo>, ApiError> {
    let token = auth.token().to_string();
    let user = web::block(move || {
        let conn = pool.get()?;
        actions::user_for_token(&conn, &token)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(user))
}

#[get("/users/{user_id}")]
async fn api_get_user(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<i32>,
) -> Result<web::Json<models::UserInfo>, ApiError> {
    let user_id = __path.into_inner();
    let token = auth.token().to_string();
    let user = web::block(move || {
        let conn = pool.get()?;
        actions::user_for_token(&conn, &token)?;
        actions::get_user(&conn, user_id)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(user))
}

#[put("/users/{user_id}")]
async fn api_update_user(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<i32>,
    web::Json(data): web::Json<models::AccountData>,
) -> Result<web::Json<models::UserInfo>, ApiError> {
    let user_id = __path.into_inner();
    let token = auth.token().to_string();
    let user = web::block(move || {
        let conn = pool.get()?;
        let current = actions::user_for_token(&conn, &token)?;
        actions::update_user(&conn, user_id, &current, &data)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(user))
}

#[delete("/users/{user_id}")]
async fn api_delete_user(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let user_id = __path.into_inner();
    let token = auth.token().to_string();
    web::block(move || {
        let conn = pool.get()?;
        let current = actions::user_for_token(&conn, &token)?;
        actions::delete_user(&conn, user_id, &current)
    })
    .await
    .map_err(blocking)?;
    Ok(HttpResponse::NoContent().finish())
}

// ------------------------- subjects -------------------------

#[post("/subjects")]
async fn api_create_subject(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    web::Json(data): web::Json<models::SubjectData>,
) -> Result<web::Json<models::Subject>, ApiError> {
    let token = auth.token().to_string();
    let subject = web::block(move || {
        let conn = pool.get()?;
        let current = actions::user_for_token(&conn, &token)?;
        actions::ensure_admin(&current)?;
        actions::create_subject(&conn, &data)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(subject))
}

#[get("/subjects")]
async fn api_subjects(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
) -> Result<web::Json<Vec<models::Subject>>, ApiError> {
    let token = auth.token().to_string();
    let subjects = web::block(move || {
        let conn = pool.get()?;
        actions::user_for_token(&conn, &token)?;
        actions::list_subjects(&conn)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(subjects))
}

#[get("/subjects/{subject_id}")]
async fn api_get_subject(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<i32>,
) -> Result<web::Json<models::Subject>, ApiError> {
    let subject_id = __path.into_inner();
    let token = auth.token().to_string();
    let subject = web::block(move || {
        let conn = pool.get()?;
        actions::user_for_token(&conn, &token)?;
        actions::get_subject(&conn, subject_id)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(subject))
}

#[put("/subjects/{subject_id}")]
async fn api_update_subject(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<i32>,
    web::Json(data): web::Json<models::SubjectData>,
) -> Result<web::Json<models::Subject>, ApiError> {
    let subject_id = __path.into_inner();
    let token = auth.token().to_string();
    let subject = web::block(move || {
        let conn = pool.get()?;
        let current = actions::user_for_token(&conn, &token)?;
        actions::ensure_admin(&current)?;
        actions::update_subject(&conn, subject_id, &data)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(subject))
}

#[delete("/subjects/{subject_id}")]
async fn api_delete_subject(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let subject_id = __path.into_inner();
    let token = auth.token().to_string();
    web::block(move || {
        let conn = pool.get()?;
        let current = actions::user_for_token(&conn, &token)?;
        actions::ensure_admin(&current)?;
        actions::delete_subject(&conn, subject_id)
    })
    .await
    .map_err(blocking)?;
    Ok(HttpResponse::NoContent().finish())
}

// ------------------------- themes -------------------------

#[post("/subjects/{subject_id}/themes")]
async fn api_create_theme(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<i32>,
    web::Json(data): web::Json<models::ThemeData>,
) -> Result<web::Json<models::Theme>, ApiError> {
    let subject_id = __path.into_inner();
    let token = auth.token().to_string();
    let theme = web::block(move || {
        let conn = pool.get()?;
        let current = actions::user_for_token(&conn, &token)?;
        actions::ensure_admin(&current)?;
        actions::create_theme(&conn, subject_id, &data)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(theme))
}

#[get("/subjects/{subject_id}/themes")]
async fn api_themes(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<i32>,
) -> Result<web::Json<Vec<models::Theme>>, ApiError> {
    let subject_id = __path.into_inner();
    let token = auth.token().to_string();
    let themes = web::block(move || {
        let conn = pool.get()?;
        actions::user_for_token(&conn, &token)?;
        actions::list_themes(&conn, subject_id)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(themes))
}

#[get("/subjects/{subject_id}/themes/{theme_id}")]
async fn api_get_theme(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<(i32, i32)>,
) -> Result<web::Json<models::Theme>, ApiError> {
    let (subject_id, theme_id) = __path.into_inner();
    let token = auth.token().to_string();
    let theme = web::block(move || {
        let conn = pool.get()?;
        actions::user_for_token(&conn, &token)?;
        actions::get_theme(&conn, subject_id, theme_id)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(theme))
}

#[put("/subjects/{subject_id}/themes/{theme_id}")]
async fn api_update_theme(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<(i32, i32)>,
    web::Json(data): web::Json<models::ThemeData>,
) -> Result<web::Json<models::Theme>, ApiError> {
    let (subject_id, theme_id) = __path.into_inner();
    let token = auth.token().to_string();
    let theme = web::block(move || {
        let conn = pool.get()?;
        let current = actions::user_for_token(&conn, &token)?;
        actions::ensure_admin(&current)?;
        actions::update_theme(&conn, subject_id, theme_id, &data)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(theme))
}

#[delete("/subjects/{subject_id}/themes/{theme_id}")]
async fn api_delete_theme(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<(i32, i32)>,
) -> Result<HttpResponse, ApiError> {
    let (subject_id, theme_id) = __path.into_inner();
    let token = auth.token().to_string();
    web::block(move || {
        let conn = pool.get()?;
        let current = actions::user_for_token(&conn, &token)?;
        actions::ensure_admin(&current)?;
        actions::delete_theme(&conn, subject_id, theme_id)
    })
    .await
    .map_err(blocking)?;
    Ok(HttpResponse::NoContent().finish())
}

// ------------------------- teachers -------------------------

#[post("/teachers")]
async fn api_create_teacher(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    web::Json(data): web::Json<models::TeacherData>,
) -> Result<web::Json<models::TeacherInfo>, ApiError> {
    let token = auth.token().to_string();
    let teacher = web::block(move || {
        let conn = pool.get()?;
        let current = actions::user_for_token(&conn, &token)?;
        actions::ensure_admin(&current)?;
        actions::create_teacher(&conn, &data)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(teacher))
}

#[get("/teachers")]
async fn api_teachers(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
) -> Result<web::Json<Vec<models::TeacherInfo>>, ApiError> {
    let token = auth.token().to_string();
    let teachers = web::block(move || {
        let conn = pool.get()?;
        actions::user_for_token(&conn, &token)?;
        actions::list_teachers(&conn)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(teachers))
}

#[get("/teachers/{teacher_id}")]
async fn api_get_teacher(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<i32>,
) -> Result<web::Json<models::TeacherInfo>, ApiError> {
    let teacher_id = __path.into_inner();
    let token = auth.token().to_string();
    let teacher = web::block(move || {
        let conn = pool.get()?;
        actions::user_for_token(&conn, &token)?;
        actions::get_teacher(&conn, teacher_id)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(teacher))
}

#[put("/teachers/{teacher_id}")]
async fn api_update_teacher(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<i32>,
    web::Json(data): web::Json<models::TeacherData>,
) -> Result<web::Json<models::TeacherInfo>, ApiError> {
    let teacher_id = __path.into_inner();
    let token = auth.token().to_string();
    let teacher = web::block(move || {
        let conn = pool.get()?;
        let current = actions::user_for_token(&conn, &token)?;
        actions::ensure_admin(&current)?;
        actions::update_teacher(&conn, teacher_id, &data)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(teacher))
}

#[delete("/teachers/{teacher_id}")]
async fn api_delete_teacher(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let teacher_id = __path.into_inner();
    let token = auth.token().to_string();
    web::block(move || {
        let conn = pool.get()?;
        let current = actions::user_for_token(&conn, &token)?;
        actions::ensure_admin(&current)?;
        actions::delete_teacher(&conn, teacher_id)
    })
    .await
    .map_err(blocking)?;
    Ok(HttpResponse::NoContent().finish())
}

// ------------------------- questions -------------------------

#[post("/themes/{theme_id}/questions")]
async fn api_create_question(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<i32>,
    web::Json(data): web::Json<models::QuestionData>,
) -> Result<web::Json<models::Question>, ApiError> {
    let theme_id = __path.into_inner();
    let token = auth.token().to_string();
    let question = web::block(move || {
        let conn = pool.get()?;
        let current = actions::user_for_token(&conn, &token)?;
        actions::ensure_admin(&current)?;
        actions::create_question(&conn, theme_id, &data)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(question))
}

#[get("/questions")]
async fn api_questions(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
) -> Result<web::Json<Vec<models::Question>>, ApiError> {
    let token = auth.token().to_string();
    let questions = web::block(move || {
        let conn = pool.get()?;
        actions::user_for_token(&conn, &token)?;
        actions::list_questions(&conn)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(questions))
}

#[get("/questions/{question_id}")]
async fn api_get_question(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<i32>,
) -> Result<web::Json<models::Question>, ApiError> {
    let question_id = __path.into_inner();
    let token = auth.token().to_string();
    let question = web::block(move || {
        let conn = pool.get()?;
        actions::user_for_token(&conn, &token)?;
        actions::get_question(&conn, question_id)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(question))
}

#[put("/questions/{question_id}")]
async fn api_update_question(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<i32>,
    web::Json(data): web::Json<models::QuestionData>,
) -> Result<web::Json<models::Question>, ApiError> {
    let question_id = __path.into_inner();
    let token = auth.token().to_string();
    let question = web::block(move || {
        let conn = pool.get()?;
        let current = actions::user_for_token(&conn, &token)?;
        actions::ensure_admin(&current)?;
        actions::update_question(&conn, question_id, &data)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(question))
}

#[delete("/questions/{question_id}")]
async fn api_delete_question(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let question_id = __path.into_inner();
    let token = auth.token().to_string();
    web::block(move || {
        let conn = pool.get()?;
        let current = actions::user_for_token(&conn, &token)?;
        actions::ensure_admin(&current)?;
        actions::delete_question(&conn, question_id)
    })
    .await
    .map_err(blocking)?;
    Ok(HttpResponse::NoContent().finish())
}

// ------------------------- tests and answers -------------------------

#[post("/subjects/{subject_id}/tests")]
async fn api_generate_test(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<i32>,
    web::Json(data): web::Json<models::GenerateTestData>,
) -> Result<web::Json<models::TestView>, ApiError> {
    let subject_id = __path.into_inner();
    let token = auth.token().to_string();
    let test = web::block(move || {
        let conn = pool.get()?;
        let current = actions::user_for_token(&conn, &token)?;
        actions::generate_test(&conn, subject_id, &data.theme_names, &current)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(test))
}

#[get("/tests")]
async fn api_tests(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
) -> Result<web::Json<Vec<models::TestSummary>>, ApiError> {
    let token = auth.token().to_string();
    let tests = web::block(move || {
        let conn = pool.get()?;
        let current = actions::user_for_token(&conn, &token)?;
        actions::list_tests(&conn, &current)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(tests))
}

#[get("/tests/{test_id}")]
async fn api_get_test(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<i32>,
) -> Result<web::Json<models::TestView>, ApiError> {
    let test_id = __path.into_inner();
    let token = auth.token().to_string();
    let test = web::block(move || {
        let conn = pool.get()?;
        let current = actions::user_for_token(&conn, &token)?;
        actions::get_test(&conn, test_id, &current)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(test))
}

#[put("/tests/{test_id}/questions/{question_id}/answer")]
async fn api_submit_answer(
    pool: web::Data<DbPool>,
    auth: BearerAuth,
    __path: web::Path<(i32, i32)>,
    web::Json(data): web::Json<models::AnswerData>,
) -> Result<web::Json<models::Answer>, ApiError> {
    let (test_id, question_id) = __path.into_inner();
    let token = auth.token().to_string();
    let answer = web::block(move || {
        let conn = pool.get()?;
        let current = actions::user_for_token(&conn, &token)?;
        actions::submit_answer(&conn, test_id, question_id, &current, &data)
    })
    .await
    .map_err(blocking)?;
    Ok(web::Json(answer))
}

fn api() -> actix_web::Scope {
    web::scope("/api")
        .service(api_index)
        .service(api_register)
        .service(api_token)
        .service(api_users)
        .service(api_current_user)
        .service(api_get_user)
        .service(api_update_user)
        .service(api_delete_user)
        .service(api_create_subject)
        .service(api_subjects)
        .service(api_create_theme)
        .service(api_themes)
        .service(api_get_theme)
        .service(api_update_theme)
        .service(api_delete_theme)
        .service(api_generate_test)
        .service(api_get_subject)
        .service(api_update_subject)
        .service(api_delete_subject)
        .service(api_create_teacher)
        .service(api_teachers)
        .service(api_get_teacher)
        .service(api_update_teacher)
        .service(api_delete_teacher)
        .service(api_create_question)
        .service(api_questions)
        .service(api_get_question)
        .service(api_update_question)
        .service(api_delete_question)
        .service(api_tests)
        .service(api_get_test)
        .service(api_submit_answer)
}

fn cors() -> actix_cors::CorsFactory {
    Cors::new()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allowed_header(header::CONTENT_TYPE)
        .allowed_header(header::AUTHORIZATION)
        .finish()
}

#[derive(StructOpt)]
struct Args {
    #[structopt(short, long, default_value = "0.0.0.0:8000")]
    bind: SocketAddr,
}

#[actix_rt::main]
async fn main() -> Result<(), exitfailure::ExitFailure> {
    env_logger::init();
    let _ = dotenv::dotenv();
    let args = Args::from_args();

    let db = std::env::var("DATABASE_URL")?;
    let cm = ConnectionManager::new(&db);
    let pool = DbPool::builder().build(cm)?;

    HttpServer::new(move || {
        App::new()
            .data(pool.clone())
            .service(api())
            .wrap(cors())
            .wrap(middleware::Logger::default())
    })
    .bind(&args.bind)?
    .run()
    .await?;
    Ok(())
}
