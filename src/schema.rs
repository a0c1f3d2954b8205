table! {
    access_tokens (id) {
        id -> Int4,
        token_hash -> Bytea,
        user_id -> Int4,
    }
}

table! {
    answers (id) {
        id -> Int4,
        given_answer -> Text,
        mark -> Int4,
        question_id -> Int4,
        test_id -> Int4,
    }
}

table! {
    questions (id) {
        id -> Int4,
        text -> Text,
        answer -> Text,
        max_mark -> Int4,
        theme_id -> Int4,
    }
}

table! {
    roles (id) {
        id -> Int4,
        name -> Text,
    }
}

table! {
    subjects (id) {
        id -> Int4,
        name -> Text,
    }
}

table! {
    teacher_theme (teacher_id, theme_id) {
        teacher_id -> Int4,
        theme_id -> Int4,
    }
}

table! {
    teachers (id) {
        id -> Int4,
        name -> Text,
        phone_number -> Text,
    }
}

table! {
    test_questions (test_id, question_id) {
        test_id -> Int4,
        question_id -> Int4,
    }
}

table! {
    tests (id) {
        id -> Int4,
        created_at -> Timestamp,
        user_id -> Int4,
    }
}

table! {
    themes (id) {
        id -> Int4,
        name -> Text,
        description -> Text,
        subject_id -> Int4,
    }
}

table! {
    users (id) {
        id -> Int4,
        email -> Text,
        name -> Text,
        password_hash -> Text,
        role_id -> Int4,
    }
}

joinable!(access_tokens -> users (user_id));
joinable!(answers -> questions (question_id));
joinable!(answers -> tests (test_id));
joinable!(questions -> themes (theme_id));
joinable!(teacher_theme -> teachers (teacher_id));
joinable!(teacher_theme -> themes (theme_id));
joinable!(test_questions -> questions (question_id));
joinable!(test_questions -> tests (test_id));
joinable!(tests -> users (user_id));
joinable!(themes -> subjects (subject_id));
joinable!(users -> roles (role_id));

allow_tables_to_appear_in_same_query!(
    access_tokens,
    answers,
    questions,
    roles,
    subjects,
    teacher_theme,
    teachers,
    test_questions,
    tests,
    themes,
    users,
);
